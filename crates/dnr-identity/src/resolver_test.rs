use super::*;
use dnr_core::config::IdentityConfig;

fn contact(source: &str, source_id: i32, id: &str, emails: &[&str], phones: &[&str]) -> ContactRecord {
    ContactRecord {
        contact_id: format!("{source}:{id}"),
        source_id,
        source_name: source.to_string(),
        source_record_id: id.to_string(),
        emails: emails.iter().map(|e| e.to_string()).collect(),
        phones: phones.iter().map(|p| p.to_string()).collect(),
        completeness: 1,
        updated_at: None,
    }
}

fn normalizer() -> KeyNormalizer {
    KeyNormalizer::new(&IdentityConfig::default())
}

fn run(contacts: &[ContactRecord]) -> IdentityMap {
    resolve(contacts, &HashMap::new(), &normalizer())
}

#[test]
fn test_same_email_different_case() {
    let map = run(&[
        contact("givebutter", 3, "1", &["a@x.com"], &[]),
        contact("givebutter", 3, "2", &["A@X.com"], &[]),
    ]);
    assert_eq!(map.report.masters, 1);
    assert_eq!(map.master_of("givebutter:1"), map.master_of("givebutter:2"));
}

#[test]
fn test_transitive_closure() {
    // A-B share an email, B-C share a phone, A and C share nothing
    let map = run(&[
        contact("keap", 1, "A", &["ann@x.com"], &[]),
        contact("stripe", 4, "B", &["ann@x.com"], &["555-123-4567"]),
        contact("kindful", 6, "C", &["other@y.org"], &["(555) 1234567"]),
        contact("kindful", 6, "D", &["dan@z.net"], &[]),
    ]);

    let a = map.master_of("keap:A").unwrap();
    assert_eq!(map.master_of("stripe:B"), Some(a));
    assert_eq!(map.master_of("kindful:C"), Some(a));
    assert_ne!(map.master_of("kindful:D"), Some(a));
    assert_eq!(map.report.masters, 2);
    assert_eq!(map.report.multi_source_masters, 1);
}

#[test]
fn test_unlinked_contacts_get_singletons() {
    let map = run(&[
        contact("keap", 1, "1", &[], &[]),
        contact("keap", 1, "2", &[], &["123"]),
        contact("keap", 1, "3", &["c@x.com"], &[]),
    ]);
    assert_eq!(map.rows.len(), 3);
    assert_eq!(map.report.masters, 3);
    assert_eq!(map.report.unlinked, 2);
    assert!(map.rows.iter().all(|r| r.is_primary));
}

#[test]
fn test_exactly_one_primary_per_master() {
    let contacts: Vec<_> = (0..20)
        .map(|i| contact("keap", 1, &i.to_string(), &[&format!("g{}@x.com", i % 4)], &[]))
        .collect();
    let map = run(&contacts);

    let mut primaries: HashMap<&str, usize> = HashMap::new();
    for row in &map.rows {
        *primaries.entry(row.master_id.as_str()).or_default() += row.is_primary as usize;
    }
    assert_eq!(primaries.len(), 4);
    assert!(primaries.values().all(|&n| n == 1));
}

#[test]
fn test_primary_prefers_complete_then_recent_then_lowest_id() {
    let mut sparse = contact("keap", 1, "1", &["a@x.com"], &[]);
    sparse.completeness = 2;
    let mut full = contact("stripe", 4, "cus_9", &["a@x.com"], &[]);
    full.completeness = 5;
    let map = run(&[sparse.clone(), full.clone()]);
    assert!(map.primary_of(map.master_of("keap:1").unwrap()).unwrap().contact_id == "stripe:cus_9");

    let mut old = contact("keap", 1, "1", &["b@x.com"], &[]);
    old.updated_at = Some("2023-01-01 00:00:00".to_string());
    let mut recent = contact("keap", 1, "2", &["b@x.com"], &[]);
    recent.updated_at = Some("2024-06-01 00:00:00".to_string());
    let map = run(&[old, recent]);
    assert_eq!(map.primary_of(map.master_of("keap:1").unwrap()).unwrap().contact_id, "keap:2");

    let map = run(&[
        contact("keap", 1, "10", &["c@x.com"], &[]),
        contact("keap", 1, "9", &["c@x.com"], &[]),
    ]);
    assert_eq!(map.primary_of(map.master_of("keap:9").unwrap()).unwrap().contact_id, "keap:9");
}

#[test]
fn test_rerun_is_deterministic() {
    let contacts = vec![
        contact("keap", 1, "1", &["a@x.com"], &["5551234567"]),
        contact("stripe", 4, "1", &["a@x.com"], &[]),
        contact("bloomerang", 5, "1", &[], &["555 123 4567"]),
        contact("kindful", 6, "7", &["z@x.com"], &[]),
    ];
    let first = run(&contacts);
    let mut reversed = contacts.clone();
    reversed.reverse();
    let second = run(&reversed);
    assert_eq!(first.rows, second.rows);
}

#[test]
fn test_master_ids_carried_over() {
    let first = run(&[
        contact("keap", 1, "1", &["a@x.com"], &[]),
        contact("keap", 1, "2", &["b@x.com"], &[]),
    ]);
    let previous: HashMap<String, String> = first
        .rows
        .iter()
        .map(|r| (r.contact_id.clone(), r.master_id.clone()))
        .collect();

    // A new contact links to keap:2 and sorts before it
    let second = resolve(
        &[
            contact("keap", 1, "1", &["a@x.com"], &[]),
            contact("keap", 1, "2", &["b@x.com"], &[]),
            contact("givebutter", 3, "0", &["b@x.com"], &[]),
        ],
        &previous,
        &normalizer(),
    );
    assert_eq!(second.master_of("keap:1"), first.master_of("keap:1"));
    assert_eq!(second.master_of("keap:2"), first.master_of("keap:2"));
    assert_eq!(second.master_of("givebutter:0"), first.master_of("keap:2"));
    assert_eq!(second.report.carried_over, 2);
}

#[test]
fn test_split_component_keeps_id_once() {
    let previous: HashMap<String, String> = [
        ("keap:1".to_string(), "m-1".to_string()),
        ("keap:2".to_string(), "m-1".to_string()),
    ]
    .into_iter()
    .collect();

    let map = resolve(
        &[
            contact("keap", 1, "1", &["a@x.com"], &[]),
            contact("keap", 1, "2", &["b@x.com"], &[]),
        ],
        &previous,
        &normalizer(),
    );
    assert_eq!(map.master_of("keap:1"), Some("m-1"));
    assert_ne!(map.master_of("keap:2"), Some("m-1"));
    assert_eq!(map.report.carried_over, 1);
}

#[test]
fn test_local_id_ordering() {
    assert_eq!(compare_local_ids("9", "10"), Ordering::Less);
    assert_eq!(compare_local_ids("b", "a"), Ordering::Greater);
    assert_eq!(compare_local_ids("10", "9a"), Ordering::Less);
}
