//! Property-based tests for IVF-Flat search ordering and bounds.

use proptest::prelude::*;

use ant::index::IvfFlatIndex;
use ant::types::KMeansParams;

fn seeded() -> KMeansParams {
    KMeansParams {
        seed: Some(11),
        ..KMeansParams::default()
    }
}

fn dataset() -> impl Strategy<Value = (usize, Vec<Vec<f32>>)> {
    (2usize..6, 8usize..48).prop_flat_map(|(dim, n)| {
        (
            Just(dim),
            prop::collection::vec(prop::collection::vec(-10.0f32..10.0, dim), n),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn search_is_bounded_sorted_and_unique(
        (dim, vectors) in dataset(),
        nlist in 1usize..5,
        top_k in 1usize..20,
        nprobe in 1usize..6,
    ) {
        let ids: Vec<i64> = (0..vectors.len() as i64).collect();
        let mut index = IvfFlatIndex::new(dim, nlist);
        index.train_and_add(&vectors, &ids, &seeded()).unwrap();

        let results = index.search(&vectors[..4], top_k, nprobe).unwrap();
        prop_assert_eq!(results.len(), 4);
        for row in &results {
            prop_assert!(row.len() <= top_k);
            prop_assert!(row.windows(2).all(|w| w[0].score >= w[1].score));
            let mut seen: Vec<i64> = row.iter().map(|r| r.id).collect();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), row.len());
        }
    }

    #[test]
    fn full_probe_matches_brute_force(
        (dim, vectors) in dataset(),
        nlist in 1usize..5,
        top_k in 1usize..10,
    ) {
        let ids: Vec<i64> = (0..vectors.len() as i64).collect();
        let mut index = IvfFlatIndex::new(dim, nlist);
        index.train_and_add(&vectors, &ids, &seeded()).unwrap();

        let query = &vectors[0];
        let mut expected: Vec<(f32, i64)> = vectors
            .iter()
            .zip(&ids)
            .map(|(v, &id)| (v.iter().zip(query).map(|(a, b)| a * b).sum(), id))
            .collect();
        expected.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        expected.truncate(top_k);

        let got = index.search(std::slice::from_ref(query), top_k, nlist).unwrap();
        let got_scores: Vec<f32> = got[0].iter().map(|r| r.score).collect();
        prop_assert_eq!(got_scores.len(), expected.len());
        for (g, (e, _)) in got_scores.iter().zip(&expected) {
            prop_assert!((g - e).abs() <= 1e-3 * e.abs().max(1.0));
        }
    }

    #[test]
    fn removed_ids_never_returned(
        (dim, vectors) in dataset(),
        remove_every in 2usize..5,
    ) {
        let ids: Vec<i64> = (0..vectors.len() as i64).collect();
        let mut index = IvfFlatIndex::new(dim, 2);
        index.train_and_add(&vectors, &ids, &seeded()).unwrap();

        let removed: Vec<i64> = ids.iter().copied().filter(|id| *id as usize % remove_every == 0).collect();
        prop_assert_eq!(index.remove(&removed), removed.len());
        prop_assert_eq!(index.count(), ids.len() - removed.len());

        let results = index.search(&vectors, vectors.len(), 2).unwrap();
        for row in results {
            prop_assert!(row.iter().all(|r| !removed.contains(&r.id)));
            prop_assert_eq!(row.len(), index.count());
        }
    }
}
