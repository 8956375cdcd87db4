use phash_dedup::{
    Fingerprint, FingerprintTable, HashEvaluator, Scheduler, SearchMethod, hamming_distance,
    resolve,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

fn fingerprint(value: u64) -> Fingerprint {
    format!("{:016x}", value).parse().unwrap()
}

/// A few random centers with noisy copies around them, so that every
/// threshold from 0 to 64 sees a mix of hits and misses.
fn clustered_table(rng: &mut StdRng, centers: usize, per_center: usize) -> FingerprintTable {
    let mut table = FingerprintTable::new();
    for c in 0..centers {
        let center: u64 = rng.random();
        table.insert(format!("c{}", c), fingerprint(center));
        for copy in 0..per_center {
            let mut value = center;
            for _ in 0..rng.random_range(0..12) {
                value ^= 1u64 << rng.random_range(0..64u32);
            }
            table.insert(format!("c{}_{}", c, copy), fingerprint(value));
        }
    }
    table
}

fn match_sets(
    table: &FingerprintTable,
    threshold: u32,
    method: SearchMethod,
    scheduler: &Scheduler,
) -> Vec<(String, BTreeSet<String>)> {
    HashEvaluator::new(table, table, threshold, method)
        .unwrap()
        .evaluate(scheduler, true)
        .iter()
        .map(|(query, matches)| {
            (
                query.to_string(),
                matches.iter().map(|d| d.name().to_string()).collect(),
            )
        })
        .collect()
}

#[test]
fn strategies_agree_for_every_threshold() {
    let mut rng = StdRng::seed_from_u64(2024);
    let table = clustered_table(&mut rng, 6, 8);
    let scheduler = Scheduler::new(4).unwrap();

    for threshold in 0..=64 {
        let brute = match_sets(&table, threshold, SearchMethod::BruteForce, &scheduler);
        let tree = match_sets(&table, threshold, SearchMethod::BkTree, &scheduler);
        assert_eq!(brute, tree, "threshold {}", threshold);
    }
}

#[test]
fn scored_lists_are_identical_between_strategies() {
    let mut rng = StdRng::seed_from_u64(99);
    let table = clustered_table(&mut rng, 4, 6);
    let scheduler = Scheduler::new(0).unwrap();

    for threshold in [0, 3, 10, 32] {
        let brute = HashEvaluator::new(&table, &table, threshold, SearchMethod::BruteForce)
            .unwrap()
            .evaluate(&scheduler, true);
        let tree = HashEvaluator::new(&table, &table, threshold, SearchMethod::BkTree)
            .unwrap()
            .evaluate(&scheduler, true);
        for (query, matches) in brute.iter() {
            assert_eq!(Some(matches), tree.get(query), "{} at {}", query, threshold);
        }
    }
}

#[test]
fn raising_the_threshold_only_adds_matches() {
    let mut rng = StdRng::seed_from_u64(5);
    let table = clustered_table(&mut rng, 5, 5);
    let scheduler = Scheduler::new(2).unwrap();

    let mut previous = match_sets(&table, 0, SearchMethod::BkTree, &scheduler);
    for threshold in 1..=64 {
        let current = match_sets(&table, threshold, SearchMethod::BkTree, &scheduler);
        for ((query, before), (_, after)) in previous.iter().zip(&current) {
            assert!(before.is_subset(after), "{} at {}", query, threshold);
        }
        previous = current;
    }

    // Everything is within 64 bits of everything else.
    for (query, matches) in &previous {
        assert_eq!(matches.len(), table.len() - 1, "{}", query);
    }
}

#[test]
fn a_query_never_matches_itself() {
    let mut rng = StdRng::seed_from_u64(11);
    let table = clustered_table(&mut rng, 3, 4);
    let scheduler = Scheduler::new(1).unwrap();

    for method in [SearchMethod::BruteForce, SearchMethod::BkTree] {
        for (query, matches) in match_sets(&table, 64, method, &scheduler) {
            assert!(!matches.contains(&query));
        }
    }
}

#[test]
fn removed_names_always_have_a_duplicate() {
    let mut rng = StdRng::seed_from_u64(314);
    let table = clustered_table(&mut rng, 7, 5);
    let scheduler = Scheduler::new(3).unwrap();

    for threshold in [0, 4, 8, 16] {
        let duplicates = HashEvaluator::new(&table, &table, threshold, SearchMethod::BruteForce)
            .unwrap()
            .evaluate(&scheduler, false);
        let to_remove = resolve(&duplicates);

        let unique: BTreeSet<&String> = to_remove.iter().collect();
        assert_eq!(unique.len(), to_remove.len());

        let removed: BTreeSet<&str> = to_remove.iter().map(String::as_str).collect();
        for name in &to_remove {
            let fingerprint = table.get(name).unwrap();
            let has_twin = table.iter().any(|(other, candidate)| {
                other != name.as_str() && hamming_distance(fingerprint, candidate) <= threshold
            });
            assert!(has_twin, "{} removed without a duplicate", name);
        }

        // A kept query has had every one of its matches removed.
        for (query, matches) in duplicates.iter() {
            if removed.contains(query) {
                continue;
            }
            for duplicate in matches {
                assert!(
                    removed.contains(duplicate.name()),
                    "{} and {} both kept",
                    query,
                    duplicate.name()
                );
            }
        }
    }
}

#[test]
fn hamming_distance_is_a_metric() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let a = fingerprint(rng.random());
        let b = fingerprint(rng.random());
        let c = fingerprint(rng.random());
        assert_eq!(hamming_distance(&a, &a), 0);
        assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        assert!(hamming_distance(&a, &b) <= 64);
        assert!(hamming_distance(&a, &c) <= hamming_distance(&a, &b) + hamming_distance(&b, &c));
    }
}

#[test]
fn out_of_range_threshold_is_rejected() {
    let table = FingerprintTable::new();
    assert!(HashEvaluator::new(&table, &table, 65, SearchMethod::BkTree).is_err());
    assert!(HashEvaluator::new(&table, &table, 64, SearchMethod::BkTree).is_ok());
}
