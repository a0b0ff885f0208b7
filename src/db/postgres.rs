use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::{postgres::PgPoolOptions, types::Json, Executor, Pool, Postgres, Transaction};
use uuid::Uuid;

use super::{Effect, Mutation, Store};
use crate::entities::{Negotiation, Ride, RideStatus};
use crate::error::Error;

type Database = Postgres;

/// Stores rides and negotiations as JSONB documents, one row each. The
/// columns next to `data` only exist to filter and sort on.
#[derive(Debug)]
pub struct PgStore {
    pool: Pool<Database>,
}

impl PgStore {
    #[tracing::instrument(name = "PgStore::new", skip(db_uri))]
    pub async fn new(db_uri: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_uri)
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS rides (id UUID PRIMARY KEY, status VARCHAR NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL)")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS rides_status_idx ON rides (status, created_at)")
            .await?;

        pool.execute("CREATE TABLE IF NOT EXISTS negotiations (id UUID PRIMARY KEY, ride_id UUID NOT NULL, created_at TIMESTAMPTZ NOT NULL, data JSONB NOT NULL, CONSTRAINT fk_negotiation_ride FOREIGN KEY(ride_id) REFERENCES rides(id))")
            .await?;
        pool.execute("CREATE INDEX IF NOT EXISTS negotiations_ride_idx ON negotiations (ride_id, created_at)")
            .await?;

        tracing::info!("connected to postgres");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip(self, ride), fields(ride_id = %ride.id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<(), Error> {
        sqlx::query("INSERT INTO rides (id, status, created_at, data) VALUES ($1, $2, $3, $4)")
            .bind(ride.id)
            .bind(ride.status.name())
            .bind(ride.created_at)
            .bind(Json(ride))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn find_ride(&self, id: Uuid) -> Result<Option<Ride>, Error> {
        let maybe_ride = sqlx::query_scalar::<_, Json<Ride>>("SELECT data FROM rides WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(maybe_ride.map(|Json(ride)| ride))
    }

    #[tracing::instrument(skip(self))]
    async fn find_rides_by_status(
        &self,
        statuses: &[RideStatus],
        limit: usize,
    ) -> Result<Vec<Ride>, Error> {
        let names: Vec<String> = statuses.iter().map(|s| s.name().to_string()).collect();

        let rides: Vec<Ride> = sqlx::query_scalar::<_, Json<Ride>>(
            "SELECT data FROM rides WHERE status = ANY($1) ORDER BY created_at ASC LIMIT $2",
        )
        .bind(names)
        .bind(sql_limit(limit))
        .fetch(&self.pool)
        .map_ok(|Json(ride)| ride)
        .try_collect()
        .await?;

        Ok(rides)
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiation(&self, id: Uuid) -> Result<Option<Negotiation>, Error> {
        let maybe_negotiation =
            sqlx::query_scalar::<_, Json<Negotiation>>("SELECT data FROM negotiations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(maybe_negotiation.map(|Json(negotiation)| negotiation))
    }

    #[tracing::instrument(skip(self))]
    async fn find_negotiations_by_ride(
        &self,
        ride_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Negotiation>, Error> {
        let negotiations: Vec<Negotiation> = sqlx::query_scalar::<_, Json<Negotiation>>(
            "SELECT data FROM negotiations WHERE ride_id = $1 ORDER BY created_at ASC LIMIT $2",
        )
        .bind(ride_id)
        .bind(sql_limit(limit))
        .fetch(&self.pool)
        .map_ok(|Json(negotiation)| negotiation)
        .try_collect()
        .await?;

        Ok(negotiations)
    }

    #[tracing::instrument(skip(self, mutation))]
    async fn apply_transition(&self, ride_id: Uuid, mutation: Mutation) -> Result<Ride, Error> {
        let mut tx = self.pool.begin().await?;

        let mut ride = fetch_ride_for_update(&mut tx, &ride_id).await?;

        let effects = match mutation(&mut ride) {
            Ok(effects) => effects,
            Err(err) => {
                tx.rollback().await?;
                return Err(err);
            }
        };

        update_ride(&mut tx, &ride).await?;

        for effect in effects {
            match effect {
                Effect::InsertNegotiation(negotiation) => {
                    insert_negotiation(&mut tx, &negotiation).await?
                }
                Effect::AcceptNegotiation(id) => mark_accepted(&mut tx, &ride_id, &id).await?,
            }
        }

        tx.commit().await?;

        Ok(ride)
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::info!("postgres pool closed");
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[tracing::instrument(skip(tx))]
async fn fetch_ride_for_update(
    tx: &mut Transaction<'_, Database>,
    id: &Uuid,
) -> Result<Ride, Error> {
    let Json(ride) =
        sqlx::query_scalar::<_, Json<Ride>>("SELECT data FROM rides WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| Error::not_found_error("Ride not found"))?;

    Ok(ride)
}

#[tracing::instrument(skip(tx, ride), fields(ride_id = %ride.id))]
async fn update_ride(tx: &mut Transaction<'_, Database>, ride: &Ride) -> Result<(), Error> {
    sqlx::query("UPDATE rides SET status = $2, data = $3 WHERE id = $1")
        .bind(ride.id)
        .bind(ride.status.name())
        .bind(Json(ride))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

#[tracing::instrument(skip(tx, negotiation), fields(negotiation_id = %negotiation.id))]
async fn insert_negotiation(
    tx: &mut Transaction<'_, Database>,
    negotiation: &Negotiation,
) -> Result<(), Error> {
    sqlx::query("INSERT INTO negotiations (id, ride_id, created_at, data) VALUES ($1, $2, $3, $4)")
        .bind(negotiation.id)
        .bind(negotiation.ride_id)
        .bind(negotiation.timestamp)
        .bind(Json(negotiation))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

#[tracing::instrument(skip(tx))]
async fn mark_accepted(
    tx: &mut Transaction<'_, Database>,
    ride_id: &Uuid,
    id: &Uuid,
) -> Result<(), Error> {
    let result = sqlx::query(
        "UPDATE negotiations SET data = jsonb_set(data, '{is_accepted}', 'true') WHERE id = $1 AND ride_id = $2",
    )
    .bind(id)
    .bind(ride_id)
    .execute(&mut **tx)
    .await?;

    // dropping the transaction rolls the ride update back
    if result.rows_affected() == 0 {
        return Err(Error::not_found_error("Negotiation not found"));
    }

    Ok(())
}

#[test]
#[ignore = "requires a running postgres"]
fn accept_in_one_transaction() {
    use tokio_test::block_on;

    block_on(async {
        let url = std::env::var("DATABASE_URL").unwrap();
        let store = PgStore::new(&url, 2).await.unwrap();

        let ride = Ride::new("John".into(), "1".into(), "x".into(), "y".into(), 25.0);
        store.insert_ride(&ride).await.unwrap();

        let offer = Negotiation::offer(&ride, None, "Alice".into(), "2".into(), 30.0, None);
        let insert = Effect::InsertNegotiation(offer.clone());
        store
            .apply_transition(
                ride.id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.receive_offer(30.0)?;
                    Ok(vec![insert])
                }),
            )
            .await
            .unwrap();

        let accepted = offer.clone();
        let ride = store
            .apply_transition(
                ride.id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.accept(&accepted)?;
                    Ok(vec![Effect::AcceptNegotiation(accepted.id)])
                }),
            )
            .await
            .unwrap();

        assert_eq!(ride.status, RideStatus::Agreed);
        let stored = store.find_negotiation(offer.id).await.unwrap().unwrap();
        assert!(stored.is_accepted);

        // a second accept is refused and leaves the ride untouched
        let again = offer.clone();
        let err = store
            .apply_transition(
                ride.id,
                Box::new(move |ride: &mut Ride| -> Result<Vec<Effect>, Error> {
                    ride.accept(&again)?;
                    Ok(vec![Effect::AcceptNegotiation(again.id)])
                }),
            )
            .await
            .unwrap_err();
        assert!(err.is_invalid_state_error());

        store.close().await;
    });
}
