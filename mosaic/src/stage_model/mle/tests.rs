use super::*;

/// 80% cluster with light jitter plus a few uniform outliers.
fn clustered_samples() -> Vec<f64> {
    let mut samples: Vec<f64> = (0..40).map(|i| 80.0 + ((i % 5) as f64 - 2.0) * 0.4).collect();
    samples.extend([5.0, 33.0, 61.0, 97.0]);
    samples
}

// ---------------------------------------------------------------------------
// Likelihood
// ---------------------------------------------------------------------------

#[test]
fn test_zero_sigma_is_impossible() {
    let samples = [80.0, 81.0];
    assert_eq!(log_likelihood(&samples, 10, 80, 0), f64::NEG_INFINITY);
}

#[test]
fn test_likelihood_prefers_the_cluster_mean() {
    let samples = clustered_samples();
    let at_mean = log_likelihood(&samples, 10, 80, 1);
    let shifted = log_likelihood(&samples, 10, 70, 1);
    assert!(at_mean > shifted);
}

#[test]
fn test_pure_normal_misses_far_samples() {
    // Without a uniform component a sample 90 sigmas away underflows to ln(0).
    let samples = [0.0, 90.0];
    assert_eq!(log_likelihood(&samples, 0, 90, 1), f64::NEG_INFINITY);
    assert!(log_likelihood(&samples, 5, 90, 1).is_finite());
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[test]
fn test_cache_miss_is_nan() {
    let cache = LikelihoodCache::new();
    assert!(cache.get(3, 4, 5).is_nan());
    cache.insert(3, 4, 5, -12.5);
    assert_eq!(cache.get(3, 4, 5), -12.5);
    assert!(cache.get(3, 4, 6).is_nan());
}

#[test]
fn test_cache_out_of_domain_keys_miss() {
    let cache = LikelihoodCache::new();
    cache.insert(100, 0, 0, 1.0);
    cache.insert(0, 0, 200, 1.0);
    assert!(cache.get(100, 0, 0).is_nan());
    assert!(cache.get(0, 0, 200).is_nan());
}

#[test]
fn test_cache_keeps_negative_infinity() {
    let cache = LikelihoodCache::new();
    let point = cache.evaluate(&[50.0], 0, 50, 0);
    assert_eq!(point.likelihood, f64::NEG_INFINITY);
    assert_eq!(cache.get(0, 50, 0), f64::NEG_INFINITY);
}

// ---------------------------------------------------------------------------
// BestPoint
// ---------------------------------------------------------------------------

#[test]
fn test_best_point_never_decreases() {
    let best = BestPoint::new();
    let likelihoods = [-50.0, -60.0, -10.0, -10.0, -90.0, -5.0, f64::NEG_INFINITY];
    let mut previous = f64::NEG_INFINITY;
    for (i, l) in likelihoods.into_iter().enumerate() {
        best.set_if_better(MlePoint {
            pi_uniform: i as u8,
            mu: 1,
            sigma: 1,
            likelihood: l,
        });
        let current = best.point().likelihood;
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(best.point().likelihood, -5.0);
    assert_eq!(best.point().pi_uniform, 5);
}

#[test]
fn test_stable_counter_resets_on_improvement() {
    let best = BestPoint::new();
    let point = |likelihood| MlePoint {
        pi_uniform: 1,
        mu: 1,
        sigma: 1,
        likelihood,
    };
    assert!(best.set_if_better(point(-3.0)));
    assert!(!best.set_if_better(point(-4.0)));
    assert!(!best.set_if_better(point(-3.0)));
    assert_eq!(best.stable_iterations(), 2);
    assert!(best.set_if_better(point(-1.0)));
    assert_eq!(best.stable_iterations(), 0);

    for _ in 0..STABLE_ITERATIONS {
        best.set_if_better(point(-2.0));
    }
    assert!(best.is_settled());
}

// ---------------------------------------------------------------------------
// Hill climb
// ---------------------------------------------------------------------------

#[test]
fn test_hill_climb_ends_at_local_maximum() {
    let samples = clustered_samples();
    let cache = LikelihoodCache::new();
    let top = hill_climb(&samples, &cache, (40, 60, 20));
    for (dp, dm, ds) in NEIGHBOR_STEPS {
        let (Some(p), Some(m), Some(s)) = (
            step(top.pi_uniform, dp),
            step(top.mu, dm),
            step(top.sigma, ds),
        ) else {
            continue;
        };
        assert!(log_likelihood(&samples, p, m, s) <= top.likelihood);
    }
}

#[test]
fn test_step_stays_in_domain() {
    assert_eq!(step(0, -1), None);
    assert_eq!(step(99, 1), None);
    assert_eq!(step(98, 1), Some(99));
    assert_eq!(step(1, -1), Some(0));
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[test]
fn test_sequential_search_finds_cluster() {
    let cancel = CancelToken::new();
    let search = MleSearch::new(MleStrategy::Sequential, 42, &cancel);
    let point = search
        .execute(&clustered_samples())
        .unwrap()
        .completed()
        .unwrap();
    assert!((point.mu as i32 - 80).abs() <= 1, "mu = {}", point.mu);
    assert!((point.overlap() - 20.0).abs() <= 1.0);
}

#[test]
fn test_sequential_search_is_reproducible() {
    let cancel = CancelToken::new();
    let samples = clustered_samples();
    let a = MleSearch::new(MleStrategy::Sequential, 9, &cancel)
        .execute(&samples)
        .unwrap();
    let b = MleSearch::new(MleStrategy::Sequential, 9, &cancel)
        .execute(&samples)
        .unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_parallel_search_finds_cluster() {
    let cancel = CancelToken::new();
    let search = MleSearch::new(MleStrategy::Parallel { workers: 4 }, 7, &cancel);
    let point = search
        .execute(&clustered_samples())
        .unwrap()
        .completed()
        .unwrap();
    assert!((point.mu as i32 - 80).abs() <= 1, "mu = {}", point.mu);
}

#[test]
fn test_cancelled_search_reports_cancellation() {
    let cancel = CancelToken::new();
    cancel.cancel();
    for strategy in [MleStrategy::Sequential, MleStrategy::Parallel { workers: 2 }] {
        let search = MleSearch::new(strategy, 1, &cancel);
        assert!(search.execute(&[80.0]).unwrap().is_cancelled());
    }
}

#[test]
fn test_search_cancel_does_not_cancel_parent() {
    let parent = CancelToken::new();
    let search = MleSearch::new(MleStrategy::Sequential, 1, &parent);
    search.cancel();
    assert!(search.execute(&[80.0]).unwrap().is_cancelled());
    assert!(!parent.is_cancelled());
}
