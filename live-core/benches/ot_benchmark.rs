use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use live_core::{text_operation, ClientStateMachine, Operation, RevisionLog};

/// A module-sized source file (~4 KB).
fn source_file() -> String {
    (0..100)
        .map(|i| format!("export const value{i} = compute({i}, 'x');\n"))
        .collect()
}

/// Single keystroke at `pos` in a document of `len` chars.
fn keystroke(len: usize, pos: usize, text: &str) -> Operation {
    Operation::new().retain(pos).insert(text).retain(len - pos)
}

fn bench_diff_keystroke(c: &mut Criterion) {
    let before = source_file();
    let mut after = before.clone();
    after.insert_str(before.len() / 2, "z");

    c.bench_function("diff_keystroke_4KB", |b| {
        b.iter(|| {
            black_box(text_operation(black_box(&before), black_box(&after)));
        })
    });
}

fn bench_diff_rewrite(c: &mut Criterion) {
    let before = source_file();
    let after = before.replace("compute", "evaluate");

    c.bench_function("diff_rewrite_4KB", |b| {
        b.iter(|| {
            black_box(text_operation(black_box(&before), black_box(&after)));
        })
    });
}

fn bench_apply(c: &mut Criterion) {
    let doc = source_file();
    let len = doc.chars().count();
    let op = keystroke(len, len / 2, "z");

    c.bench_function("apply_keystroke_4KB", |b| {
        b.iter(|| {
            black_box(op.apply(black_box(&doc)).unwrap());
        })
    });
}

fn bench_transform(c: &mut Criterion) {
    let len = source_file().chars().count();
    let a = keystroke(len, 10, "a");
    let b_op = keystroke(len, len - 10, "b");

    c.bench_function("transform_keystrokes", |b| {
        b.iter(|| {
            black_box(black_box(&a).transform(black_box(&b_op)).unwrap());
        })
    });
}

fn bench_compose_100(c: &mut Criterion) {
    let len = source_file().chars().count();
    let ops: Vec<Operation> = (0..100).map(|i| keystroke(len + i, i, "k")).collect();

    c.bench_function("compose_100_keystrokes", |b| {
        b.iter(|| {
            let mut acc = ops[0].clone();
            for op in &ops[1..] {
                acc = acc.compose(op).unwrap();
            }
            black_box(acc);
        })
    });
}

fn bench_transform_forward_100(c: &mut Criterion) {
    let len = source_file().chars().count();
    let mut log = RevisionLog::new(256);
    for i in 0..100 {
        log.append(keystroke(len + i, 0, "r"));
    }
    let late = keystroke(len, len, "!");

    c.bench_function("transform_forward_100_revisions", |b| {
        b.iter(|| {
            black_box(log.transform_forward(black_box(late.clone()), 0).unwrap());
        })
    });
}

fn bench_client_remote_while_buffering(c: &mut Criterion) {
    let doc = source_file();
    let len = doc.chars().count();
    let mut first = doc.clone();
    first.insert(0, 'a');
    let mut second = first.clone();
    second.push('b');

    c.bench_function("client_remote_while_buffering", |b| {
        b.iter(|| {
            let mut client = ClientStateMachine::with_document(doc.clone(), 0);
            client.local_edit(&doc, &first).unwrap();
            client.local_edit(&first, &second).unwrap();
            black_box(client.apply_server(keystroke(len, len / 2, "r")).unwrap());
        })
    });
}

criterion_group!(
    benches,
    bench_diff_keystroke,
    bench_diff_rewrite,
    bench_apply,
    bench_transform,
    bench_compose_100,
    bench_transform_forward_100,
    bench_client_remote_while_buffering,
);
criterion_main!(benches);
