//! Contract parity: both backends must implement every storage operation
//! with identical observable behavior. Each case runs once per backend.

use chrono::{Duration, Utc};
use tempfile::TempDir;
use warden_storage::{SqlSettings, Store};
use warden_types::{NoteDraft, PlayerId, Punishment, PunishmentKind, WarningDraft};

fn each_backend(check: impl Fn(&Store)) {
    let file_dir = TempDir::new().expect("tempdir");
    let file = Store::file(file_dir.path()).expect("open file store");
    check(&file);
    file.close().expect("close file store");

    let sql_dir = TempDir::new().expect("tempdir");
    let sql = Store::sql(SqlSettings::new(sql_dir.path().join("warden.db")))
        .expect("open sql store");
    check(&sql);
    sql.close().expect("close sql store");
}

#[test]
fn active_filter_is_applied_by_the_backend() {
    each_backend(|store| {
        let target = PlayerId::random();
        store
            .insert_punishment(&Punishment::new(
                target,
                PunishmentKind::Ban,
                "cheating",
                None,
                None,
            ))
            .unwrap();
        store
            .insert_punishment(&Punishment::new(
                target,
                PunishmentKind::Mute,
                "flood",
                None,
                None,
            ))
            .unwrap();

        assert_eq!(store.punishments_for(target).unwrap().len(), 2);
        assert_eq!(
            store
                .deactivate_punishments(target, PunishmentKind::Ban)
                .unwrap(),
            1
        );

        let active = store.punishments_for(target).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].kind, PunishmentKind::Mute);
    });
}

#[test]
fn deactivation_reports_zero_when_nothing_matches() {
    each_backend(|store| {
        let count = store
            .deactivate_punishments(PlayerId::random(), PunishmentKind::Ban)
            .unwrap();
        assert_eq!(count, 0);
    });
}

#[test]
fn issuer_query_returns_inactive_rows_too() {
    each_backend(|store| {
        let issuer = PlayerId::random();
        let target = PlayerId::random();
        store
            .insert_punishment(&Punishment::new(
                target,
                PunishmentKind::Ban,
                "cheating",
                Some(issuer),
                None,
            ))
            .unwrap();
        store
            .deactivate_punishments(target, PunishmentKind::Ban)
            .unwrap();

        let issued = store.punishments_by_issuer(issuer).unwrap();
        assert_eq!(issued.len(), 1);
        assert!(!issued[0].active);
    });
}

#[test]
fn address_ban_cascade_hits_every_row_for_the_address() {
    each_backend(|store| {
        let address = "203.0.113.7";
        let first = PlayerId::random();
        let second = PlayerId::random();
        for target in [first, second] {
            store
                .insert_punishment(
                    &Punishment::new(target, PunishmentKind::IpBan, "evasion", None, None)
                        .with_address(address),
                )
                .unwrap();
        }
        // An IP ban on a different address must not be touched.
        let other = PlayerId::random();
        store
            .insert_punishment(
                &Punishment::new(other, PunishmentKind::IpBan, "evasion", None, None)
                    .with_address("198.51.100.2"),
            )
            .unwrap();

        assert_eq!(store.punishments_by_address(address).unwrap().len(), 2);
        assert_eq!(store.deactivate_address_bans(address).unwrap(), 2);
        assert!(store.punishments_by_address(address).unwrap().is_empty());
        assert_eq!(
            store.punishments_by_address("198.51.100.2").unwrap().len(),
            1
        );
    });
}

#[test]
fn notes_are_assigned_ids_and_hard_deleted() {
    each_backend(|store| {
        let target = PlayerId::random();
        let issuer = PlayerId::random();

        let mut ids = Vec::new();
        for content in ["first", "second", "third"] {
            let note = store
                .insert_note(NoteDraft::new(target, Some(issuer), content))
                .unwrap();
            ids.push(note.id);
        }
        assert_eq!(store.notes_for(target).unwrap().len(), 3);

        assert!(store.remove_note(target, ids[1]).unwrap());
        let remaining = store.notes_for(target).unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|n| n.id != ids[1]));
        assert!(store.note(ids[1]).unwrap().is_none());

        // Removing again reports not-found.
        assert!(!store.remove_note(target, ids[1]).unwrap());
    });
}

#[test]
fn warnings_are_soft_deleted_and_listed_in_full() {
    each_backend(|store| {
        let target = PlayerId::random();
        let warning = store
            .insert_warning(WarningDraft::new(target, None, "language", 3))
            .unwrap();
        assert!(warning.active);

        assert!(store.deactivate_warning(target, warning.id).unwrap());
        assert!(!store.deactivate_warning(target, warning.id).unwrap());

        let all = store.warnings_for(target).unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].active);

        let by_id = store.warning(warning.id).unwrap().expect("warning exists");
        assert!(!by_id.active);
    });
}

#[test]
fn expired_scan_sees_only_lapsed_temporary_rows() {
    each_backend(|store| {
        let now = Utc::now();
        let lapsed = PlayerId::random();
        store
            .insert_punishment(&Punishment::new(
                lapsed,
                PunishmentKind::TempBan,
                "spam",
                None,
                Some(now - Duration::minutes(1)),
            ))
            .unwrap();
        store
            .insert_punishment(&Punishment::new(
                PlayerId::random(),
                PunishmentKind::TempBan,
                "spam",
                None,
                Some(now + Duration::hours(1)),
            ))
            .unwrap();
        store
            .insert_punishment(&Punishment::new(
                PlayerId::random(),
                PunishmentKind::Ban,
                "cheating",
                None,
                None,
            ))
            .unwrap();

        let expired = store.expired_punishments(now).unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].target, lapsed);
    });
}

#[test]
fn address_book_tracks_one_address_per_identity() {
    each_backend(|store| {
        let a = PlayerId::random();
        let b = PlayerId::random();

        store.record_address(a, "203.0.113.7").unwrap();
        store.record_address(b, "203.0.113.7").unwrap();

        let mut at = store.identities_at("203.0.113.7").unwrap();
        at.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(at, expected);

        // Moving one identity away shrinks the reverse entry.
        store.record_address(b, "198.51.100.2").unwrap();
        assert_eq!(store.identities_at("203.0.113.7").unwrap(), vec![a]);
        assert_eq!(store.address_of(b).unwrap().as_deref(), Some("198.51.100.2"));
        assert!(store.identities_at("192.0.2.1").unwrap().is_empty());
    });
}

#[test]
fn punishment_fields_survive_the_round_trip() {
    each_backend(|store| {
        let target = PlayerId::random();
        let issuer = PlayerId::random();
        let expiry = Utc::now() + Duration::hours(2);
        store
            .insert_punishment(
                &Punishment::new(
                    target,
                    PunishmentKind::IpBan,
                    "shared account abuse",
                    Some(issuer),
                    Some(expiry),
                )
                .with_address("203.0.113.7"),
            )
            .unwrap();

        let rows = store.punishments_for(target).unwrap();
        assert_eq!(rows.len(), 1);
        let p = &rows[0];
        assert_eq!(p.kind, PunishmentKind::IpBan);
        assert_eq!(p.reason, "shared account abuse");
        assert_eq!(p.issuer, Some(issuer));
        assert_eq!(p.address.as_deref(), Some("203.0.113.7"));
        assert!(p.active);
        // Millisecond precision is the storage resolution.
        let stored = p.expires_at.expect("temporary row keeps its expiry");
        assert_eq!(stored.timestamp_millis(), expiry.timestamp_millis());
    });
}
