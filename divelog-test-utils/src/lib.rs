//! divelog Test Utilities
//!
//! Shared test infrastructure for the divelog crates:
//! - Proptest generators for entities and time windows
//! - Seed fixtures mirroring a small social graph of divers
//! - Custom assertions over `DiveLogResult`

// Re-export core types for convenience
pub use divelog_core::*;
pub use divelog_services::Services;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating divelog entity types.

    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Generate a random EntityId.
    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        any::<[u8; 16]>().prop_map(|bytes| EntityId::new(Uuid::from_bytes(bytes)))
    }

    /// Generate a Timestamp between 2020 and 2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now))
    }

    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,15}"
    }

    /// Passwords are kept short: bcrypt only reads the first 72 bytes.
    pub fn arb_password() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9]{6,20}"
    }

    /// A user whose email is derived from the username, so distinct
    /// usernames never collide on email.
    pub fn arb_user() -> impl Strategy<Value = User> {
        ("[A-Z][a-z]{1,10}", arb_username(), arb_password()).prop_map(
            |(name, username, password)| {
                let email = format!("{username}@example.com");
                User::new(name, username, email, password)
            },
        )
    }

    /// A set of distinct usernames.
    pub fn arb_usernames(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set(arb_username(), 1..=max)
            .prop_map(|names| names.into_iter().collect())
    }

    /// `(time_in, time_out)` with `time_in <= time_out`, at most ten hours
    /// apart.
    pub fn arb_time_window() -> impl Strategy<Value = (Timestamp, Timestamp)> {
        (arb_timestamp(), 0i64..36_000)
            .prop_map(|(time_in, secs)| (time_in, time_in + Duration::seconds(secs)))
    }

    /// A dive whose bottom and safety stop times fit inside its window.
    pub fn arb_consistent_dive(owner: EntityId) -> impl Strategy<Value = Dive> {
        arb_time_window().prop_flat_map(move |(time_in, time_out)| {
            let minutes = (time_out - time_in).num_minutes() as f64;
            (0.0..=minutes, Just((time_in, time_out))).prop_map(move |(bottom, (time_in, time_out))| {
                Dive {
                    time_in: Some(time_in),
                    time_out: Some(time_out),
                    bottom_time: Some(bottom.floor()),
                    safety_stop_time: Some(0.0),
                    ..Dive::owned_by(owner)
                }
            })
        })
    }

    pub fn arb_gear() -> impl Strategy<Value = Gear> {
        ("[A-Z][a-z]{1,8}", "[A-Z][a-z]{1,8}", "[A-Z][0-9]{1,3}", "[a-z]{3,8}").prop_map(
            |(name, brand, model, gear_type)| Gear {
                name: Some(name),
                brand: Some(brand),
                model: Some(model),
                gear_type: Some(gear_type),
                ..Default::default()
            },
        )
    }

    pub fn arb_message_text() -> impl Strategy<Value = String> {
        "[A-Za-z ]{1,40}"
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Seed data: four users, two clubs, three pieces of gear, five dives and
    //! three groups, wired together the way the application's own seeding
    //! routine does it.

    use super::*;
    use chrono::{TimeZone, Utc};

    /// `(name, username, email, password)` for the four seed users.
    pub const USERS: [(&str, &str, &str, &str); 4] = [
        ("User 1", "user1", "user1@example.com", "aafghd7675"),
        ("User 2", "user2", "user2@example.com", "jhhd6625"),
        ("User 3", "user3", "user3@example.com", "hd8y78rw4y"),
        ("User 4", "user4", "user4@example.com", "hjkfdshds787"),
    ];

    /// Which resources to seed beyond the users.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SeedResources {
        pub dives: bool,
        pub clubs: bool,
        pub gear: bool,
        pub groups: bool,
    }

    impl SeedResources {
        pub fn all() -> Self {
            Self {
                dives: true,
                clubs: true,
                gear: true,
                groups: true,
            }
        }
    }

    /// A seed user as stored, with its plaintext password kept for login.
    #[derive(Debug, Clone)]
    pub struct SeededUser {
        pub user: User,
        pub password: &'static str,
    }

    impl SeededUser {
        pub fn id(&self) -> EntityId {
            self.user.id.unwrap_or_else(EntityId::nil)
        }

        pub fn token(&self) -> Option<&str> {
            self.user.token.as_deref()
        }
    }

    /// Everything [`seed_database`] wrote, in creation order.
    #[derive(Debug, Clone, Default)]
    pub struct Seeded {
        pub users: Vec<SeededUser>,
        pub clubs: Vec<Club>,
        pub gear: Vec<Gear>,
        pub dives: Vec<Dive>,
        pub groups: Vec<Group>,
    }

    pub fn seed_user(index: usize) -> User {
        let (name, username, email, password) = USERS[index];
        User::new(name, username, email, password)
    }

    pub fn club(name: &str, location: &str, description: &str, website: &str) -> Club {
        Club {
            name: Some(name.to_string()),
            location: Some(location.to_string()),
            description: Some(description.to_string()),
            website: Some(website.to_string()),
            ..Default::default()
        }
    }

    pub fn gear(name: &str, brand: &str, model: &str, gear_type: &str) -> Gear {
        Gear {
            name: Some(name.to_string()),
            brand: Some(brand.to_string()),
            model: Some(model.to_string()),
            gear_type: Some(gear_type.to_string()),
            ..Default::default()
        }
    }

    /// A dive on `day` of January 2020, entering at 11:00.
    pub fn dive_on(day: u32, minutes: u32, bottom: f64, max_depth: f64, location: &str) -> Dive {
        let time_in = Utc.with_ymd_and_hms(2020, 1, day, 11, 0, 0).single();
        let time_out = Utc.with_ymd_and_hms(2020, 1, day, 11, minutes, 0).single();
        Dive {
            time_in,
            time_out,
            bottom_time: Some(bottom),
            safety_stop_time: Some(3.0),
            max_depth: Some(max_depth),
            location: Some(location.to_string()),
            description: Some(format!("Dive description{}", location.trim_start_matches("Sample location"))),
            public: Some(true),
            ..Default::default()
        }
    }

    fn seed_dives() -> [Dive; 5] {
        let mut private = dive_on(3, 22, 19.0, 15.9, "Sample location 2");
        private.public = Some(false);
        [
            dive_on(1, 25, 22.0, 17.3, "Sample location"),
            dive_on(2, 22, 19.0, 15.5, "Sample location"),
            dive_on(3, 22, 19.0, 15.9, "Sample location 2"),
            private,
            dive_on(3, 22, 19.0, 15.9, "Sample location 2"),
        ]
    }

    fn ids(users: &[&SeededUser]) -> Option<Vec<Ref<User>>> {
        Some(users.iter().map(|u| Ref::Id(u.id())).collect())
    }

    /// Wipe the store and write the seed data through the services, so every
    /// back-reference is maintained by the same code paths as production.
    pub async fn seed_database(services: &Services, resources: SeedResources) -> DiveLogResult<Seeded> {
        services.db.drop_all().await?;
        let mut seeded = Seeded::default();

        for (index, (_, _, _, password)) in USERS.iter().enumerate() {
            let user = services.users.create(&seed_user(index)).await?;
            seeded.users.push(SeededUser { user, password: *password });
        }
        let [u1, u2, u3, _] = [0, 1, 2, 3].map(|i| seeded.users[i].clone());

        if resources.clubs {
            let memberships = [(vec![&u1, &u3], vec![&u2]), (vec![&u3], vec![&u1])];
            let details = [("A", "B", "C", "example.com"), ("X", "Y", "Z", "example.co.uk")];
            for ((managers, members), (name, location, description, website)) in
                memberships.into_iter().zip(details)
            {
                let data = Club {
                    managers: ids(&managers),
                    members: ids(&members),
                    ..club(name, location, description, website)
                };
                seeded.clubs.push(services.clubs.create(&data).await?);
            }
        }

        if resources.gear {
            let owned = [
                (gear("A", "A", "B", "C"), &u1),
                (gear("X", "Y", "Z", "W"), &u1),
                (gear("X", "Y", "Z", "W"), &u2),
            ];
            for (data, owner) in owned {
                let data = Gear {
                    owner: Some(Ref::Id(owner.id())),
                    ..data
                };
                seeded.gear.push(services.gear.create(&data).await?);
            }
        }

        if resources.dives {
            let club0 = seeded.clubs.first().and_then(|c| c.id).map(Ref::Id);
            let gear_ref = |i: usize| seeded.gear.get(i).and_then(|g| g.id).map(Ref::Id);
            let gear0: Vec<_> = gear_ref(0).into_iter().collect();
            let gear01: Vec<_> = gear_ref(0).into_iter().chain(gear_ref(1)).collect();

            let links = [
                (&u1, club0, ids(&[&u2]), Some(gear0)),
                (&u2, None, ids(&[&u1]), Some(gear01)),
                (&u1, None, Some(Vec::new()), Some(Vec::new())),
                (&u2, None, Some(Vec::new()), Some(Vec::new())),
                (&u2, None, Some(Vec::new()), Some(Vec::new())),
            ];
            for (data, (owner, club, buddies, gear)) in seed_dives().into_iter().zip(links) {
                let data = Dive {
                    user: Some(Ref::Id(owner.id())),
                    club,
                    buddies,
                    gear,
                    ..data
                };
                seeded.dives.push(services.dives.create(&data).await?);
            }
        }

        if resources.groups {
            let rosters = [
                ("New Group", &u1, [&u1, &u2]),
                ("New Group 2", &u2, [&u2, &u3]),
                ("New Group 3", &u1, [&u1, &u2]),
            ];
            for (name, sender, participants) in rosters {
                let data = Group {
                    name: Some(name.to_string()),
                    participants: ids(&participants),
                    messages: Some(vec![Message::new("Hi", sender.id())]),
                    ..Default::default()
                };
                seeded.groups.push(services.groups.create(&data).await?);
            }
        }

        Ok(seeded)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for divelog error variants.

    use super::*;

    /// Assert that a DiveLogResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DiveLogResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a DiveLogResult is Err.
    #[track_caller]
    pub fn assert_err<T: std::fmt::Debug>(result: &DiveLogResult<T>) {
        assert!(result.is_err(), "Expected Err, got Ok: {:?}", result);
    }

    /// Assert that a DiveLogResult is a NotFound storage error for `resource`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DiveLogResult<T>, resource: &str) {
        match result {
            Err(DiveLogError::Storage(StorageError::NotFound { resource: r, .. })) => {
                assert_eq!(*r, resource, "Wrong resource in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", resource, other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &DiveLogResult<T>) {
        match result {
            Err(DiveLogError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_membership_error<T: std::fmt::Debug>(
        result: &DiveLogResult<T>,
        expected: MembershipError,
    ) {
        match result {
            Err(DiveLogError::Membership(e)) => assert_eq!(*e, expected),
            other => panic!("Expected {:?}, got: {:?}", expected, other),
        }
    }

    #[track_caller]
    pub fn assert_time_window_error<T: std::fmt::Debug>(
        result: &DiveLogResult<T>,
        expected: TimeWindowError,
    ) {
        match result {
            Err(DiveLogError::TimeWindow(e)) => assert_eq!(*e, expected),
            other => panic!("Expected {:?}, got: {:?}", expected, other),
        }
    }

    /// Assert that a DiveLogResult is an Auth error.
    #[track_caller]
    pub fn assert_auth_error<T: std::fmt::Debug>(result: &DiveLogResult<T>) {
        match result {
            Err(DiveLogError::Auth(_)) => {}
            other => panic!("Expected Auth error, got: {:?}", other),
        }
    }

    /// Assert that a reference list holds exactly `expected`, in order.
    #[track_caller]
    pub fn assert_ids<T: Identified>(refs: &[Ref<T>], expected: &[EntityId]) {
        let actual: Vec<Option<EntityId>> = refs.iter().map(|r| r.resolve_id()).collect();
        let expected: Vec<Option<EntityId>> = expected.iter().copied().map(Some).collect();
        assert_eq!(actual, expected, "Reference list mismatch");
    }
}

// ============================================================================
// TESTS
// ============================================================================
