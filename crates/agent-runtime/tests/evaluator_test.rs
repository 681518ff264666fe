use agent_runtime::{AttributeEvaluator, AttributeSpec, CancelToken, CommandRunner, Error, FaultSpec};
use std::thread;
use std::time::{Duration, Instant};

fn evaluator() -> AttributeEvaluator {
    AttributeEvaluator::new(CommandRunner::new(Duration::from_secs(10)))
}

fn fault(name: &str, language: &str, code: &str) -> FaultSpec {
    FaultSpec {
        name: name.to_string(),
        language: language.to_string(),
        code: code.to_string(),
    }
}

fn attribute(prefix: &str, language: &str, code: &str) -> AttributeSpec {
    AttributeSpec {
        prefix: prefix.to_string(),
        language: language.to_string(),
        code: code.to_string(),
    }
}

#[test]
fn bash_output_is_trimmed() {
    let outcome = evaluator().eval_code("bash", "echo '  hello  '\n").unwrap();
    assert_eq!(outcome.output, "hello");
    assert_eq!(outcome.error, None);
}

#[test]
fn carriage_returns_are_stripped_from_code() {
    let outcome = evaluator().eval_code("bash", "X=ok\r\necho $X\r\n").unwrap();
    assert_eq!(outcome.output, "ok");
}

#[test]
fn unknown_language_is_a_silent_noop() {
    let outcome = evaluator().eval_code("cobol", "DISPLAY 'HI'").unwrap();
    assert_eq!(outcome.output, "");
    assert_eq!(outcome.error, None);
}

#[test]
fn non_zero_exit_is_reported_but_output_kept() {
    let outcome = evaluator().eval_code("bash", "echo partial; echo broken >&2; exit 2").unwrap();
    assert_eq!(outcome.output, "partial");
    let error = outcome.error.unwrap();
    assert!(error.contains("broken"), "{error}");
}

#[test]
fn timeout_is_reported_as_error() {
    let evaluator = AttributeEvaluator::new(CommandRunner::new(Duration::from_millis(200)));
    let outcome = evaluator.eval_code("bash", "sleep 5; echo late").unwrap();
    assert_eq!(outcome.output, "");
    assert!(outcome.error.unwrap().contains("timed out"));
}

#[test]
fn triggered_faults_have_output() {
    let faults = evaluator().evaluate_faults(&[
        fault("disk-full", "bash", "echo FULL"),
        fault("healthy", "bash", "true"),
        fault("unknown", "fortran", "PRINT *, 'X'"),
    ])
    .unwrap();

    assert_eq!(faults.len(), 3);
    assert_eq!(faults[0].value, "FULL");
    assert!(faults[0].is_triggered());
    assert!(!faults[1].is_triggered());
    assert!(!faults[2].is_triggered());
}

#[test]
fn empty_attributes_are_alerts() {
    let attributes = evaluator().evaluate_attributes(&[
        attribute("HST", "bash", "echo host-01"),
        attribute("NIL", "bash", "printf ''"),
    ])
    .unwrap();

    assert_eq!(attributes[0].prefix, "HST");
    assert_eq!(attributes[0].value, "host-01");
    assert!(!attributes[0].is_alert());
    assert!(attributes[1].is_alert());
}

#[test]
fn cancellation_stops_evaluation() {
    let cancel = CancelToken::new();
    let evaluator = AttributeEvaluator::new(
        CommandRunner::new(Duration::from_secs(30)).with_cancel(cancel.clone()),
    );
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();
    });

    let start = Instant::now();
    let err = evaluator
        .evaluate_attributes(&[
            attribute("SLW", "bash", "sleep 3; echo v"),
            attribute("NXT", "bash", "sleep 3; echo v"),
        ])
        .unwrap_err();
    canceller.join().unwrap();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[test]
fn cancelled_script_is_not_a_script_error() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let evaluator =
        AttributeEvaluator::new(CommandRunner::new(Duration::from_secs(10)).with_cancel(cancel));

    let err = evaluator.eval_code("bash", "echo never").unwrap_err();
    assert!(matches!(err, Error::Cancelled { .. }));

    // unknown languages never run, so they are unaffected
    assert_eq!(evaluator.eval_code("cobol", "X").unwrap().output, "");
}
