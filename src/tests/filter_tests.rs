use super::rules::{classify, shorten_frame, RuleAction, RACE_BANNER, RULES};
use super::ConsoleFilter;

fn run_filter(chunks: &[&str]) -> Vec<String> {
    let mut filter = ConsoleFilter::new();
    for chunk in chunks {
        filter.add(chunk);
    }
    filter.flush();
    filter.drain()
}

const MIXED_OUTPUT: &str = concat!(
    "=== RUN   TestAlpha\n",
    "=== RUN   TestAlpha/case_one\n",
    "--- PASS: TestAlpha/case_one (0.00s)\n",
    "--- PASS: TestAlpha (0.00s)\n",
    "=== RUN   TestBeta\n",
    "    beta_test.go:14: expected 3, got 4\n",
    "--- FAIL: TestBeta (0.02s)\n",
    "go: downloading example.com/dep v1.2.3\n",
    "=== RUN   TestGamma\n",
    "    gamma_test.go:9: [DEBUG] cache warmed\n",
    "--- PASS: TestGamma (0.00s)\n",
    "FAIL\n",
    "coverage: 41.5% of statements\n",
    "FAIL\texample.com/demo\t0.210s\n",
);

#[test]
fn passing_test_block_is_discarded() {
    let out = run_filter(&["=== RUN TestX\n--- PASS: TestX (0.01s)\n"]);
    assert!(out.is_empty(), "unexpected output: {out:?}");
}

#[test]
fn failing_test_block_is_emitted_in_order() {
    let out = run_filter(&["=== RUN TestX\n    x_test.go:5: boom\n--- FAIL: TestX (0.01s)\n"]);
    assert_eq!(
        out,
        vec![
            "=== RUN TestX".to_owned(),
            "    x_test.go:5: boom".to_owned(),
            "--- FAIL: TestX (0.01s)".to_owned(),
        ]
    );
}

#[test]
fn fragmented_pass_marker_is_reassembled() {
    let out = run_filter(&["=== RUN   TestFrag\n", "--- PASS: TestFrag (0", ".00s)\n"]);
    assert!(out.is_empty(), "unexpected output: {out:?}");
}

#[test]
fn arbitrary_chunking_matches_single_chunk_output() {
    let whole = run_filter(&[MIXED_OUTPUT]);
    assert!(!whole.is_empty());

    for size in [1usize, 2, 3, 7, 16, 64] {
        let bytes = MIXED_OUTPUT.as_bytes();
        let chunks = bytes
            .chunks(size)
            .map(|chunk| std::str::from_utf8(chunk).expect("ascii fixture"))
            .collect::<Vec<&str>>();
        assert_eq!(run_filter(&chunks), whole, "chunk size {size}");
    }
}

#[test]
fn mixed_output_keeps_only_failure_and_debug_lines() {
    let out = run_filter(&[MIXED_OUTPUT]);
    assert_eq!(
        out,
        vec![
            "    gamma_test.go:9: [DEBUG] cache warmed".to_owned(),
            "=== RUN   TestBeta".to_owned(),
            "    beta_test.go:14: expected 3, got 4".to_owned(),
            "--- FAIL: TestBeta (0.02s)".to_owned(),
        ]
    );
}

#[test]
fn panic_mode_passes_everything_through() {
    let out = run_filter(&[
        "=== RUN   TestBoom\n",
        "panic: runtime error: index out of range [3] with length 3\n",
        "\n",
        "goroutine 7 [running]:\n",
        "testing.tRunner.func1.2({0x5f1e40, 0xc000016180})\n",
        "\t/usr/local/go/src/testing/testing.go:1545 +0x238\n",
        "example.com/demo.TestBoom(0xc0000a2340)\n",
        "\t/home/dev/demo/boom_test.go:12 +0x1d\n",
        "--- PASS: TestOther (0.00s)\n",
    ]);
    assert_eq!(
        out,
        vec![
            "=== RUN   TestBoom".to_owned(),
            "panic: runtime error: index out of range [3] with length 3".to_owned(),
            "".to_owned(),
            "goroutine 7 [running]:".to_owned(),
            "testing.tRunner.func1.2({0x5f1e40, 0xc000016180})".to_owned(),
            "\t/usr/local/go/src/testing/testing.go:1545 +0x238".to_owned(),
            "example.com/demo.TestBoom(0xc0000a2340)".to_owned(),
            "\t/home/dev/demo/boom_test.go:12 +0x1d".to_owned(),
            "--- PASS: TestOther (0.00s)".to_owned(),
        ]
    );
}

#[test]
fn race_banner_is_emitted_once_at_flush() {
    let mut filter = ConsoleFilter::new();
    for _ in 0..4 {
        filter.add("==================\nWARNING: DATA RACE\n==================\n");
    }
    assert!(filter.race_detected());
    assert!(filter.emitted().is_empty());

    filter.flush();
    filter.flush();
    let out = filter.drain();
    assert_eq!(
        out.iter().filter(|line| line.as_str() == RACE_BANNER).count(),
        1
    );
}

#[test]
fn orphaned_pass_marker_is_dropped() {
    let out = run_filter(&["--- PASS: TestNeverStarted (0.00s)\n"]);
    assert!(out.is_empty());
}

#[test]
fn interleaved_pass_removes_only_its_markers() {
    let mut filter = ConsoleFilter::new();
    filter.add("=== RUN   TestA\n=== RUN   TestB\n    b_test.go:3: waiting\n--- PASS: TestA (0.00s)\n");
    assert_eq!(
        filter.held(),
        &[
            "=== RUN   TestB".to_owned(),
            "    b_test.go:3: waiting".to_owned()
        ]
    );
}

#[test]
fn nested_subtests_are_removed_as_one_block() {
    let mut filter = ConsoleFilter::new();
    filter.add("=== RUN   TestA\n=== RUN   TestA/sub\n    a_test.go:8: note\n    --- PASS: TestA/sub (0.00s)\n");
    assert_eq!(filter.held(), &["=== RUN   TestA".to_owned()]);
    filter.add("--- PASS: TestA (0.00s)\n");
    assert!(filter.held().is_empty());
}

#[test]
fn project_frames_are_shortened_and_held() {
    let mut filter = ConsoleFilter::new();
    filter.add("\t/home/dev/demo/internal/store/store.go:88 +0x1d\n");
    assert_eq!(filter.held(), &["store.go:88".to_owned()]);
}

#[test]
fn result_marker_flushes_held_lines() {
    let mut filter = ConsoleFilter::new();
    filter.add("    db_test.go:4: connection refused\n");
    assert!(filter.emitted().is_empty());
    filter.add("FAIL\texample.com/demo/db\t0.004s\n");
    assert_eq!(
        filter.drain(),
        vec!["    db_test.go:4: connection refused".to_owned()]
    );
}

#[test]
fn trailing_partial_line_is_processed_on_flush() {
    let mut filter = ConsoleFilter::new();
    filter.add("    cfg_test.go:2: missing key");
    assert_eq!(filter.pending(), "    cfg_test.go:2: missing key");
    filter.flush();
    assert_eq!(
        filter.drain(),
        vec!["    cfg_test.go:2: missing key".to_owned()]
    );
}

#[test]
fn rule_table_orders_panic_before_noise() {
    let names = RULES.iter().map(|rule| rule.name).collect::<Vec<&str>>();
    assert_eq!(
        names,
        vec![
            "panic",
            "always-show",
            "data-race",
            "noise",
            "stdlib-frame",
            "project-frame",
            "pointer-call",
            "result-marker",
        ]
    );
}

#[test]
fn classify_covers_each_rule_kind() {
    let action = |line: &str| classify(line).map(|rule| rule.action);
    assert_eq!(action("panic: boom"), Some(RuleAction::EnterPanicMode));
    assert_eq!(action("DEBUG: state=1"), Some(RuleAction::Emit));
    assert_eq!(action("WARNING: DATA RACE"), Some(RuleAction::MarkRace));
    assert_eq!(
        action("?   \texample.com/demo/cmd\t[no test files]"),
        Some(RuleAction::Drop)
    );
    assert_eq!(
        action("ok  \texample.com/demo\t(cached)"),
        Some(RuleAction::Drop)
    );
    assert_eq!(action("=== PAUSE TestA"), Some(RuleAction::Drop));
    assert_eq!(
        action("\t/usr/local/go/src/runtime/panic.go:770 +0x132"),
        Some(RuleAction::Drop)
    );
    assert_eq!(
        action("\t/srv/app/handler.go:41 +0x88"),
        Some(RuleAction::ShortenFrame)
    );
    assert_eq!(
        action("example.com/demo.(*Server).Serve(0xc0001a4000)"),
        Some(RuleAction::Drop)
    );
    assert_eq!(
        action("ok  \texample.com/demo\t0.12s"),
        Some(RuleAction::FlushAndDrop)
    );
    assert_eq!(action("    x_test.go:5: boom"), None);
}

#[test]
fn shorten_frame_keeps_file_and_line() {
    assert_eq!(shorten_frame("\t/a/b/c/main.go:7 +0x2a"), "main.go:7");
    assert_eq!(shorten_frame("/tmp/proj/x.go:12"), "x.go:12");
}
