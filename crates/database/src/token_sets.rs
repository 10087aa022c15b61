use {
    crate::{Address, PgTransaction},
    sqlx::{types::BigDecimal, PgConnection},
};

/// Stores a token set and its materialized membership. Token set ids are a
/// pure function of the set's content, so re-inserting an existing id is a
/// no-op rather than a conflict.
pub async fn insert(
    ex: &mut PgTransaction<'_>,
    id: &str,
    contract: &Address,
    schema: &serde_json::Value,
    token_ids: &[BigDecimal],
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO token_sets (id, contract, schema) VALUES ($1, $2, $3) \
        ON CONFLICT DO NOTHING;";
    sqlx::query(QUERY)
        .bind(id)
        .bind(contract)
        .bind(schema)
        .execute(&mut **ex)
        .await?;

    const QUERY_TOKEN: &str = "\
        INSERT INTO token_sets_tokens (token_set_id, contract, token_id) \
        VALUES ($1, $2, $3) \
        ON CONFLICT DO NOTHING;";
    for token_id in token_ids {
        sqlx::query(QUERY_TOKEN)
            .bind(id)
            .bind(contract)
            .bind(token_id)
            .execute(&mut **ex)
            .await?;
    }
    Ok(())
}

pub async fn exists(ex: &mut PgConnection, id: &str) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "SELECT EXISTS(SELECT 1 FROM token_sets WHERE id = $1);";
    sqlx::query_scalar(QUERY).bind(id).fetch_one(ex).await
}

/// Whether the materialized set contains the token.
pub async fn contains(
    ex: &mut PgConnection,
    id: &str,
    contract: &Address,
    token_id: &BigDecimal,
) -> Result<bool, sqlx::Error> {
    const QUERY: &str = "\
        SELECT EXISTS(\
            SELECT 1 FROM token_sets_tokens \
            WHERE token_set_id = $1 AND contract = $2 AND token_id = $3\
        );";
    sqlx::query_scalar(QUERY)
        .bind(id)
        .bind(contract)
        .bind(token_id)
        .fetch_one(ex)
        .await
}

pub async fn token_ids(
    ex: &mut PgConnection,
    id: &str,
) -> Result<Vec<BigDecimal>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT token_id FROM token_sets_tokens WHERE token_set_id = $1 \
        ORDER BY token_id;";
    sqlx::query_scalar(QUERY).bind(id).fetch_all(ex).await
}
