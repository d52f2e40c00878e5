//! Unit tests for the priority queue and hash-segment arithmetic

use datadiff::config::PartitionSettings;
use datadiff::queue::PriorityQueue;
use datadiff::segment::{local_split_factor, BucketCounts, HashSegment, QueueEntry};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_interleaved_push_pop_always_returns_maximum() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut queue = PriorityQueue::new(|a: &u32, b: &u32| a > b);
    let mut shadow: Vec<u32> = Vec::new();

    for _ in 0..5_000 {
        if rng.gen_bool(0.6) || shadow.is_empty() {
            let value = rng.gen_range(0..1_000);
            queue.push(value);
            shadow.push(value);
        } else {
            let expected = *shadow.iter().max().unwrap();
            let popped = queue.pop().unwrap();
            assert_eq!(popped, expected);
            let position = shadow.iter().position(|v| *v == expected).unwrap();
            shadow.swap_remove(position);
        }
        assert_eq!(queue.len(), shadow.len());
    }

    let mut drained = Vec::new();
    while let Some(value) = queue.pop() {
        drained.push(value);
    }
    shadow.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(drained, shadow);
    assert!(queue.pop().is_none());
}

#[test]
fn test_queue_entries_ordered_by_size_then_depth() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut queue = PriorityQueue::new(QueueEntry::is_higher_priority);

    for i in 0..500u64 {
        let depth = rng.gen_range(0..4u32);
        let segment = HashSegment {
            modulus: 4u64.pow(depth),
            bucket: i % 4u64.pow(depth),
            depth,
        };
        let entry = if rng.gen_bool(0.5) {
            QueueEntry::pending(segment, rng.gen_range(0..50))
        } else {
            QueueEntry::sized(segment, rng.gen_range(0..50), rng.gen_range(0..50))
        };
        queue.push(entry);
    }

    let mut previous: Option<QueueEntry> = None;
    while let Some(entry) = queue.pop() {
        if let Some(prev) = previous {
            assert!(
                !QueueEntry::is_higher_priority(&entry, &prev),
                "{:?} popped after lower-priority {:?}",
                entry,
                prev
            );
        }
        previous = Some(entry);
    }
}

#[test]
fn test_random_splits_preserve_counts() {
    let mut rng = StdRng::seed_from_u64(3);
    let fine_modulus = 4u64.pow(3);
    let counts: Vec<u64> = (0..fine_modulus).map(|_| rng.gen_range(0..1_000)).collect();
    let fine = BucketCounts::new(fine_modulus, counts);

    let mut frontier = vec![HashSegment::root()];
    let mut leaves_total = 0;
    while let Some(segment) = frontier.pop() {
        let count = fine.segment_count(&segment).unwrap();
        if segment.modulus == fine_modulus || rng.gen_bool(0.3) {
            leaves_total += count;
            continue;
        }
        let children = segment.children(4);
        let children_total: u64 = children
            .iter()
            .map(|c| fine.segment_count(c).unwrap())
            .sum();
        assert_eq!(children_total, count);
        frontier.extend(children);
    }
    assert_eq!(leaves_total, fine.total());
}

#[test]
fn test_split_chain_stays_within_ceiling() {
    let settings = PartitionSettings {
        row_threshold: 1_000,
        split_factor: 4,
        ..PartitionSettings::default()
    };
    let max_rows = 1_000_000;
    let depth = settings.effective_depth(max_rows);
    let final_modulus = settings.final_modulus(depth);
    assert_eq!(depth, 5);
    assert_eq!(final_modulus, 1_024);

    // Follow the largest child down with worst-case skew
    let mut segment = HashSegment::root();
    let mut rows = max_rows;
    while segment.depth < depth && rows > settings.row_threshold {
        let k = local_split_factor(rows, settings.row_threshold, settings.split_factor);
        assert!((2..=settings.split_factor).contains(&k));
        segment = segment.children(k)[0];
        rows = rows * 9 / 10;
    }
    assert!(segment.depth <= depth);
    assert!(segment.modulus <= final_modulus);
}

#[test]
fn test_depth_clamped_by_settings() {
    let shallow = PartitionSettings {
        max_depth: 1,
        ..PartitionSettings::default()
    };
    assert_eq!(shallow.effective_depth(1_000_000), 1);

    let ceiling = PartitionSettings {
        row_threshold: 1,
        split_factor: 2,
        max_depth: 50,
        max_modulus: u64::MAX,
        ..PartitionSettings::default()
    };
    assert_eq!(ceiling.effective_depth(u64::MAX), 10);

    let small_modulus = PartitionSettings {
        row_threshold: 1,
        max_modulus: 64,
        ..PartitionSettings::default()
    };
    let depth = small_modulus.effective_depth(1_000_000);
    assert_eq!(depth, 3);
    assert_eq!(small_modulus.final_modulus(depth), 64);
}
