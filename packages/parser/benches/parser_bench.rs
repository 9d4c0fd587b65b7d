use criterion::{black_box, criterion_group, criterion_main, Criterion};
use quire_parser::{parse, LosslessSerializer, TextEdit, TextPatch};

fn descriptor(dependencies: usize) -> String {
    let mut source = String::from(
        "<?xml version=\"1.0\"?>\n<project>\n  <groupId>org.acme</groupId>\n  <dependencies>\n",
    );
    for i in 0..dependencies {
        source.push_str(&format!(
            "    <dependency>\n      <groupId>g{i}</groupId>\n      <artifactId>a{i}</artifactId>\n      <version>1.{i}</version>\n    </dependency>\n"
        ));
    }
    source.push_str("  </dependencies>\n</project>\n");
    source
}

fn parse_small(c: &mut Criterion) {
    let source = descriptor(5);
    c.bench_function("parse_small_descriptor", |b| b.iter(|| parse(black_box(&source))));
}

fn parse_large(c: &mut Criterion) {
    let source = descriptor(500);
    c.bench_function("parse_large_descriptor", |b| b.iter(|| parse(black_box(&source))));
}

fn lossless_roundtrip(c: &mut Criterion) {
    let source = descriptor(200);
    let model = parse(&source).unwrap();
    c.bench_function("lossless_roundtrip", |b| {
        b.iter(|| LosslessSerializer::new(black_box(&source)).serialize(&model))
    });
}

fn patch_apply(c: &mut Criterion) {
    let source = descriptor(200);
    let offset = source.find("1.7").unwrap();
    let patch = TextPatch::build(&source, vec![TextEdit::replace(&source, offset..offset + 3, "2.0")]).unwrap();
    c.bench_function("patch_apply", |b| b.iter(|| patch.apply_to(black_box(&source))));
}

criterion_group!(benches, parse_small, parse_large, lossless_roundtrip, patch_apply);
criterion_main!(benches);
