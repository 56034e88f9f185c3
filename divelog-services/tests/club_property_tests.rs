//! Property-Based Tests for Club Membership and Delete Cascades
//!
//! **Property: Cascade on Delete**
//!
//! Deleting a club or a piece of gear leaves zero occurrences of its id in
//! every affected user's back-reference lists, checked with a fresh read.
//!
//! **Scenario: Club Lifecycle**
//!
//! Create, add a manager, delete, and check both managers were scrubbed.

use divelog_services::{AuthConfig, Services};
use divelog_test_utils::assertions::{assert_ids, assert_not_found};
use divelog_test_utils::generators::{arb_gear, arb_usernames};
use divelog_test_utils::{contains_id, Club, EntityId, Gear, Ref, User};
use proptest::prelude::*;
use tokio::runtime::Runtime;

fn test_services() -> Services {
    Services::in_memory_with_auth(AuthConfig::default().with_bcrypt_cost(4))
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn create_users(services: &Services, usernames: &[String]) -> Result<Vec<EntityId>, TestCaseError> {
    let mut ids = Vec::with_capacity(usernames.len());
    for username in usernames {
        let user = User::new(
            username.as_str(),
            username.as_str(),
            format!("{username}@example.com"),
            "password1",
        );
        let created = services.users.create(&user).await?;
        ids.push(created.id.ok_or_else(|| TestCaseError::fail("created user has no id"))?);
    }
    Ok(ids)
}

async fn fresh_user(services: &Services, id: EntityId) -> Result<User, TestCaseError> {
    services
        .users
        .get(id, None, &[])
        .await?
        .ok_or_else(|| TestCaseError::fail(format!("user {id} vanished")))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// **Property: Cascade on Delete (Club)**
    ///
    /// Every user is made a manager, a member, or both, in a random pattern.
    /// After the delete nobody references the club.
    #[test]
    fn prop_club_delete_scrubs_every_user(
        usernames in arb_usernames(5),
        roles in proptest::collection::vec((any::<bool>(), any::<bool>()), 5),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = test_services();
            let ids = create_users(&services, &usernames).await?;
            let club = services.clubs.create(&Club::new("A", "B", ids[0])).await?;
            let club_id = club.id.ok_or_else(|| TestCaseError::fail("club has no id"))?;

            for (user, (manager, member)) in ids.iter().zip(&roles) {
                if *manager {
                    services.clubs.add_manager(club_id, *user).await?;
                }
                if *member {
                    services.clubs.add_member(club_id, *user).await?;
                }
            }

            let deleted = services.clubs.delete(club_id).await?;
            prop_assert!(deleted.is_some());
            prop_assert!(services.clubs.get(club_id, None, &[]).await?.is_none());

            for id in &ids {
                let user = fresh_user(&services, *id).await?;
                prop_assert!(!contains_id(user.managed_clubs(), club_id));
                prop_assert!(!contains_id(user.member_clubs(), club_id));
            }
            Ok(())
        })?;
    }

    /// **Property: Cascade on Delete (Gear)**
    #[test]
    fn prop_gear_delete_pulls_from_owner(
        items in proptest::collection::vec(arb_gear(), 1..5),
        victim in any::<prop::sample::Index>(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let services = test_services();
            let owner = create_users(&services, &["owner".to_string()]).await?[0];

            let mut ids = Vec::new();
            for item in items {
                let created = services.gear.create(&Gear { owner: Some(Ref::Id(owner)), ..item }).await?;
                ids.push(created.id.ok_or_else(|| TestCaseError::fail("gear has no id"))?);
            }
            assert_ids(fresh_user(&services, owner).await?.gear(), &ids);

            let gone = ids.remove(victim.index(ids.len()));
            services.gear.delete(gone).await?;

            let user = fresh_user(&services, owner).await?;
            prop_assert!(!contains_id(user.gear(), gone));
            assert_ids(user.gear(), &ids);
            assert_not_found(&services.gear.delete(gone).await, "Gear");
            Ok(())
        })?;
    }
}

#[test]
fn test_club_lifecycle_scenario() {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let services = test_services();
        let ids = create_users(&services, &["u1".to_string(), "u2".to_string()])
            .await
            .unwrap();
        let (u1, u2) = (ids[0], ids[1]);

        let club = services.clubs.create(&Club::new("A", "B", u1)).await.unwrap();
        assert_ids(club.managers(), &[u1]);
        let club_id = club.id.unwrap();

        let club = services.clubs.add_manager(club_id, u2).await.unwrap().unwrap();
        assert_ids(club.managers(), &[u1, u2]);
        let manager = services.users.get(u2, None, &[]).await.unwrap().unwrap();
        assert!(contains_id(manager.managed_clubs(), club_id));

        services.clubs.delete(club_id).await.unwrap();
        assert!(services.clubs.get(club_id, None, &[]).await.unwrap().is_none());
        for id in [u1, u2] {
            let user = services.users.get(id, None, &[]).await.unwrap().unwrap();
            assert!(!contains_id(user.managed_clubs(), club_id));
        }
    });
}
