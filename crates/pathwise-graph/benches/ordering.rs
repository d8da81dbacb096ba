use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use pathwise_graph::{Skill, SkillCategory, SkillGraph};
use std::hint::black_box;

/// Layered graph: every skill depends on up to three skills of the previous layer.
fn layered_graph(layers: usize, width: usize) -> SkillGraph {
    let mut skills = Vec::with_capacity(layers * width);
    for layer in 0..layers {
        for slot in 0..width {
            let mut skill = Skill::new(format!("l{layer:03}-s{slot:03}"), SkillCategory::Concept);
            if layer > 0 {
                for offset in 0..3 {
                    let prev = (slot + offset) % width;
                    skill
                        .prerequisites
                        .insert(format!("l{:03}-s{prev:03}", layer - 1));
                }
            }
            skills.push(skill);
        }
    }
    SkillGraph::from_skills(skills).expect("layered graph is acyclic")
}

fn topological_order_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("topological_order");

    for (layers, width) in [(5, 10), (20, 25), (50, 40)] {
        let graph = layered_graph(layers, width);
        let ids: Vec<String> = graph.skills().map(|s| s.id.clone()).collect();
        group.bench_with_input(
            BenchmarkId::new("skills", ids.len()),
            &ids,
            |b, ids| {
                b.iter(|| graph.topological_order(black_box(ids)).unwrap());
            },
        );
    }

    group.finish();
}

fn transitive_prerequisites_bench(c: &mut Criterion) {
    let graph = layered_graph(50, 40);
    c.bench_function("transitive_prerequisites/deepest", |b| {
        b.iter(|| graph.transitive_prerequisites(black_box("l049-s000")).unwrap());
    });
}

criterion_group!(benches, topological_order_bench, transitive_prerequisites_bench);
criterion_main!(benches);
