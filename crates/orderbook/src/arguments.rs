//! Command line and environment configuration.
//!
//! Parsed by the deployment binary, which wires the node backed `ChainData`
//! implementation, the Postgres storage and the engine together; the
//! library crates only consume the parsed values.

use {
    model::kinds::CanonicalizeContext,
    primitive_types::H160,
    std::{fmt::Display, time::Duration},
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    /// Url of the Postgres database. By default connects to locally running
    /// postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// The chain this orderbook serves. Orders whose kind is not deployed on
    /// the chain are rejected at submission.
    #[clap(long, env, default_value = "1")]
    pub chain_id: u64,

    /// Addresses whose oracle co-signatures are accepted for orders that
    /// require one.
    #[clap(long, env, use_value_delimiter = true)]
    pub allowed_oracles: Vec<H160>,

    /// How often stored orders get their fillability re-checked against
    /// chain state.
    #[clap(
        long,
        env,
        default_value = "1m",
        value_parser = humantime::parse_duration,
    )]
    pub revalidation_interval: Duration,

    /// Upper bound on the number of token ids a criteria order may commit
    /// to, and on how many tokens get their best order recomputed eagerly
    /// when such an order changes.
    #[clap(long, env, default_value = "10000")]
    pub max_token_list_len: usize,
}

impl Arguments {
    /// The canonicalization settings these arguments imply.
    pub fn canonicalize_context(&self) -> CanonicalizeContext {
        CanonicalizeContext {
            chain_id: self.chain_id,
            max_token_list_len: self.max_token_list_len,
        }
    }
}

impl Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "db_url: SECRET")?;
        writeln!(f, "chain_id: {}", self.chain_id)?;
        writeln!(f, "allowed_oracles: {:?}", self.allowed_oracles)?;
        writeln!(
            f,
            "revalidation_interval: {:?}",
            self.revalidation_interval
        )?;
        writeln!(f, "max_token_list_len: {}", self.max_token_list_len)?;
        Ok(())
    }
}
