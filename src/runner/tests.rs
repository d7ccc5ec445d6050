use super::*;
use crate::cache::{EntryState, Provisioned, RecycleAction, provider_fn};
use crate::dispatcher::{PreparedRequest, Transport, TransportFuture};
use crate::response::ResponseView;
use crate::verify::verify;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

struct EmptyTransport;

impl Transport for EmptyTransport {
    fn execute(&self, request: PreparedRequest) -> TransportFuture<'_> {
        Box::pin(async move {
            Ok(ResponseView::new(
                request.method,
                request.url,
                204,
                "No Content",
                Vec::<(String, String)>::new(),
                Vec::new(),
            ))
        })
    }
}

fn runner_with(max_parallelism: usize) -> (TestRunner, Arc<Mutex<Vec<String>>>) {
    let config = Arc::new(HarnessConfig::default().with_max_parallelism(max_parallelism));
    let dispatcher = Dispatcher::new(EmptyTransport, &config);
    let cache = ResourceCache::new();
    let recycled = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&recycled);
    cache.register(
        "token",
        provider_fn(move |_ctx, key: ResourceKey| {
            let log = Arc::clone(&log);
            async move {
                let name = key.name().to_string();
                let action = RecycleAction::new("record", move || async move {
                    log.lock().unwrap().push(name);
                    Ok(())
                });
                Ok(Provisioned::new(format!("token-{}", key.name())).recycle_with(action))
            }
        }),
    );
    cache.register(
        "org",
        provider_fn(|_ctx, key: ResourceKey| async move {
            Err::<Provisioned<String>, _>(HarnessError::creation(&key, "status 400"))
        }),
    );
    (TestRunner::new(cache, dispatcher, config), recycled)
}

fn admin() -> ResourceKey {
    ResourceKey::new("token", "admin")
}

#[tokio::test]
async fn requirements_are_ready_and_recycled_after_the_body() {
    let (runner, recycled) = runner_with(4);
    let key = admin();
    let cache = runner.cache().clone();
    let probe = key.clone();

    let report = runner
        .run(
            TestCase::new("uses_admin_token")
                .requires([key.clone()])
                .recycles([key.clone()])
                .body(move |ctx| async move {
                    verify(ctx.cache().state(&probe)).is(EntryState::Ready)?;
                    let token: String = ctx.get(&probe).await?;
                    verify(token).is("token-admin")?;
                    verify(ctx.cache().snapshot(&probe).map(|s| s.consumers)).is(Some(1))?;
                    Ok(())
                }),
        )
        .await;

    assert!(report.passed(), "{:?}", report.outcome);
    assert!(report.recycle_errors.is_empty());
    assert_eq!(*recycled.lock().unwrap(), vec!["admin".to_string()]);
    assert_eq!(cache.state(&key), EntryState::NotStarted);
}

#[tokio::test]
async fn failing_body_still_recycles() {
    let (runner, recycled) = runner_with(4);

    let report = runner
        .run(
            TestCase::new("fails")
                .requires([admin()])
                .recycles([admin()])
                .body(|ctx| async move {
                    let pending = ctx.send(&crate::request::RequestSpec::get("/x")).await?;
                    verify(pending.status()).is(200u16)?;
                    Ok(())
                }),
        )
        .await;

    match &report.outcome {
        Err(HarnessError::Assertion(failure)) => {
            assert_eq!(failure.expected, "200");
            assert_eq!(failure.actual, "204");
        }
        other => panic!("expected assertion failure, got {other:?}"),
    }
    assert_eq!(recycled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn panics_become_failed_outcomes() {
    let (runner, recycled) = runner_with(4);

    let report = runner
        .run(
            TestCase::new("panics")
                .requires([admin()])
                .recycles([admin()])
                .body(|_ctx| async move {
                    if true {
                        panic!("boom");
                    }
                    Ok(())
                }),
        )
        .await;

    assert_eq!(
        report.outcome,
        Err(HarnessError::Panicked {
            message: "boom".to_string()
        })
    );
    assert_eq!(recycled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn setup_failure_skips_the_body() {
    let (runner, _) = runner_with(4);
    let ran = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&ran);

    let report = runner
        .run(
            TestCase::new("needs_blacklisted_org")
                .requires([ResourceKey::new("org", "blacklist-x")])
                .body(move |_ctx| async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .await;

    assert!(matches!(
        report.outcome,
        Err(HarnessError::ResourceCreation { .. })
    ));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn soft_checks_fail_the_test_after_the_body() {
    let (runner, _) = runner_with(4);

    let report = runner
        .run(TestCase::new("soft").body(|ctx| async move {
            ctx.check(verify_labeled_status(404));
            ctx.check(verify(1).is(1));
            Ok(())
        }))
        .await;

    match report.outcome {
        Err(HarnessError::Assertion(failure)) => {
            assert_eq!(failure.label.as_deref(), Some("status"))
        }
        other => panic!("expected soft failure, got {other:?}"),
    }
}

fn verify_labeled_status(status: u16) -> crate::verify::Check {
    crate::verify::verify_labeled(status, "status").is(200u16)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelism_is_capped() {
    let (runner, _) = runner_with(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let cases = (0..6)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            TestCase::new(format!("case-{i}")).body(move |_ctx| async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .collect();

    let reports = runner.run_all(cases).await;
    assert!(reports.iter().all(TestReport::passed));
    assert!(peak.load(Ordering::SeqCst) <= 2);
    let names: Vec<_> = reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["case-0", "case-1", "case-2", "case-3", "case-4", "case-5"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn serial_tests_run_alone() {
    let (runner, _) = runner_with(8);
    let running = Arc::new(AtomicUsize::new(0));

    let mut cases = Vec::new();
    for i in 0..8 {
        let running = Arc::clone(&running);
        let case = TestCase::new(format!("case-{i}"));
        let case = if i % 3 == 0 { case.serial() } else { case };
        let serial = case.is_serial();
        cases.push(case.body(move |_ctx| async move {
            let at_start = running.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(20)).await;
            let at_end = running.load(Ordering::SeqCst);
            running.fetch_sub(1, Ordering::SeqCst);
            if serial {
                verify_labeled_running(at_start)?;
                verify_labeled_running(at_end)?;
            }
            Ok(())
        }));
    }

    let reports = runner.run_all(cases).await;
    for report in reports {
        assert!(report.passed(), "{}: {:?}", report.name, report.outcome);
    }
}

fn verify_labeled_running(now: usize) -> crate::verify::Check {
    crate::verify::verify_labeled(now, "tests running next to a serial test").is(1usize)
}

#[tokio::test]
async fn case_without_body_fails_and_shutdown_recycles_everything() {
    let (runner, recycled) = runner_with(1);
    let report = runner
        .run(TestCase::new("empty").requires([admin()]))
        .await;
    assert!(matches!(
        report.outcome,
        Err(HarnessError::InvalidRequest { .. })
    ));

    let shutdown = runner.shutdown().await;
    assert_eq!(shutdown.recycled, vec![admin()]);
    assert_eq!(*recycled.lock().unwrap(), vec!["admin".to_string()]);
}
