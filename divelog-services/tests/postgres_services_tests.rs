#![cfg(feature = "db-tests")]
//! Consistency services over a live PostgreSQL document store.
//!
//! Point `DIVELOG_DB_*` at a scratch database; the seed helper wipes it.

use divelog_services::{AuthConfig, DbBackendKind, DiveLogConfig, Services};
use divelog_test_utils::assertions::assert_ids;
use divelog_test_utils::fixtures::{seed_database, SeedResources};
use divelog_test_utils::{contains_id, Club};

async fn postgres_services() -> Services {
    let config = DiveLogConfig::from_env()
        .expect("DIVELOG_* environment must parse")
        .with_db_backend(DbBackendKind::Postgres)
        .with_auth(AuthConfig::default().with_bcrypt_cost(4));
    Services::launch(config)
        .await
        .expect("PostgreSQL must be reachable for db-tests")
}

#[tokio::test]
async fn test_club_lifecycle_on_postgres() {
    let services = postgres_services().await;
    let seeded = seed_database(&services, SeedResources::default()).await.unwrap();
    let (u1, u2) = (seeded.users[0].id(), seeded.users[1].id());

    let club = services.clubs.create(&Club::new("A", "B", u1)).await.unwrap();
    let club_id = club.id.unwrap();
    let club = services.clubs.add_manager(club_id, u2).await.unwrap().unwrap();
    assert_ids(club.managers(), &[u1, u2]);

    services.clubs.delete(club_id).await.unwrap();
    assert!(services.clubs.get(club_id, None, &[]).await.unwrap().is_none());
    for id in [u1, u2] {
        let user = services.users.get(id, None, &[]).await.unwrap().unwrap();
        assert!(!contains_id(user.managed_clubs(), club_id));
    }
    services.close().await.unwrap();
}

#[tokio::test]
async fn test_full_seed_on_postgres() {
    let services = postgres_services().await;
    let seeded = seed_database(&services, SeedResources::all()).await.unwrap();
    let owner = services.users.get(seeded.users[1].id(), None, &[]).await.unwrap().unwrap();
    assert_eq!(owner.dives().len(), 3);
    assert_eq!(owner.gear().len(), 1);
    services.close().await.unwrap();
}
