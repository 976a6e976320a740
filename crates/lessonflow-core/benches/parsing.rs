use criterion::{black_box, criterion_group, criterion_main, Criterion};

use lessonflow_core::cloze::find_anchors;
use lessonflow_core::parser::{parse_lesson_str, validate_lesson};

fn bench_toml_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("toml_parsing");

    // Generate lesson TOML strings of various sizes
    let small_toml = generate_lesson_toml(5);
    let medium_toml = generate_lesson_toml(50);
    let large_toml = generate_lesson_toml(200);

    group.bench_function("5_arms", |b| {
        b.iter(|| parse_lesson_str(black_box(&small_toml), black_box("bench.toml".as_ref())))
    });

    group.bench_function("50_arms", |b| {
        b.iter(|| parse_lesson_str(black_box(&medium_toml), black_box("bench.toml".as_ref())))
    });

    group.bench_function("200_arms", |b| {
        b.iter(|| parse_lesson_str(black_box(&large_toml), black_box("bench.toml".as_ref())))
    });

    group.finish();
}

fn bench_validation(c: &mut Criterion) {
    let lesson = parse_lesson_str(&generate_lesson_toml(200), "bench.toml".as_ref())
        .expect("bench lesson parses");
    c.bench_function("validate_200_arms", |b| {
        b.iter(|| validate_lesson(black_box(&lesson)))
    });
}

fn bench_anchor_scan(c: &mut Criterion) {
    let contents: String = (1..=100)
        .map(|i| format!("<p>Sentence {i} has a <a class=\"cloze\" id=\"cloze-{i}\"></a> gap.</p>"))
        .collect();
    c.bench_function("find_100_anchors", |b| {
        b.iter(|| find_anchors(black_box(&contents)))
    });
}

/// A branch table followed by `n` arms of one cloze page and one
/// end-of-branch page each.
fn generate_lesson_toml(n: usize) -> String {
    let mut s = String::new();
    s.push_str(
        r#"[lesson]
id = 1
name = "Benchmark"
scoring = "custom"

[[pages]]
id = 1
kind = "branchtable"
title = "Choose"
"#,
    );
    for i in 0..n {
        s.push_str(&format!(
            r#"
[[pages.answers]]
text = "Arm {i}"
jump = {target}
"#,
            target = 100 + i * 2
        ));
    }
    for i in 0..n {
        let question = 100 + i * 2;
        s.push_str(&format!(
            r#"
[[pages]]
id = {question}
kind = "cloze"
title = "Gap {i}"
contents = '<p>Fill <a class="cloze" id="cloze-1"></a> in.</p>'

[[pages.answers]]
text = "one, two, =word{i}"
response = "Checked."
score = 1

[[pages]]
id = {eob}
kind = "endofbranch"

[[pages.answers]]
jump = 1
"#,
            eob = question + 1
        ));
    }
    s
}

criterion_group!(benches, bench_toml_parsing, bench_validation, bench_anchor_scan);
criterion_main!(benches);
