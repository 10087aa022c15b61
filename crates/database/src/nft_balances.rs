use {
    crate::Address,
    sqlx::{types::BigDecimal, PgConnection},
};

/// Upserts the tracked balance of one owner for one token.
pub async fn upsert(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    owner: &Address,
    amount: &BigDecimal,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO nft_balances (contract, token_id, owner, amount) \
        VALUES ($1, $2, $3, $4) \
        ON CONFLICT (contract, token_id, owner) DO UPDATE \
        SET amount = EXCLUDED.amount;";
    sqlx::query(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(owner)
        .bind(amount)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn balance_of(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
    owner: &Address,
) -> Result<BigDecimal, sqlx::Error> {
    const QUERY: &str = "\
        SELECT COALESCE(\
            (SELECT amount FROM nft_balances \
             WHERE contract = $1 AND token_id = $2 AND owner = $3), \
            0\
        );";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(token_id)
        .bind(owner)
        .fetch_one(ex)
        .await
}

/// Current holders of the token. Used to keep a maker's bid from being
/// ranked as the best buy order for a token the maker already owns.
pub async fn owners_of(
    ex: &mut PgConnection,
    contract: &Address,
    token_id: &BigDecimal,
) -> Result<Vec<Address>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT owner FROM nft_balances \
        WHERE contract = $1 AND token_id = $2 AND amount > 0;";
    sqlx::query_scalar(QUERY)
        .bind(contract)
        .bind(token_id)
        .fetch_all(ex)
        .await
}

#[cfg(test)]
mod tests {
    use {super::*, sqlx::Connection};

    #[tokio::test]
    #[ignore]
    async fn postgres_balance_round_trip() {
        let mut db = PgConnection::connect("postgresql://").await.unwrap();
        let mut db = db.begin().await.unwrap();
        crate::clear_DANGER_(&mut db).await.unwrap();

        let contract = Address::from([1; 20]);
        let owner = Address::from([2; 20]);
        assert_eq!(
            balance_of(&mut db, &contract, &1.into(), &owner)
                .await
                .unwrap(),
            BigDecimal::from(0)
        );

        upsert(&mut db, &contract, &1.into(), &owner, &3.into())
            .await
            .unwrap();
        assert_eq!(
            balance_of(&mut db, &contract, &1.into(), &owner)
                .await
                .unwrap(),
            BigDecimal::from(3)
        );
        assert_eq!(owners_of(&mut db, &contract, &1.into()).await.unwrap(), [
            owner
        ]);

        // Transferring everything away drops the owner from the holder list.
        upsert(&mut db, &contract, &1.into(), &owner, &0.into())
            .await
            .unwrap();
        assert!(owners_of(&mut db, &contract, &1.into())
            .await
            .unwrap()
            .is_empty());
    }
}
