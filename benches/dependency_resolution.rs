//! Measures the cost of resource initialization (topological ordering plus
//! per-resource dependency resolution) over a chain of resources of
//! increasing width.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use runcore::model::deps::{DependenciesDecl, DependencyRef, DependencySpecMap};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder, ResourceWithConfig};
use runcore::runtime::RuntimeBuilder;

fn build_chain_app(width: usize) -> ResourceWithConfig {
    let mut registerables = Vec::with_capacity(width);
    for i in 0..width {
        let mut spec: DependencySpecMap = DependencySpecMap::new();
        if i > 0 {
            spec.insert("prev".to_string(), DependencyRef::resource(format!("r{}", i - 1)));
        }
        let resource = ResourceBuilder::new(format!("r{i}"))
            .dependencies(DependenciesDecl::Static(spec))
            .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
            .build()
            .unwrap();
        registerables.push(Registerable::Resource(resource.with(()).unwrap()));
    }

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(registerables))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    app.with(()).unwrap()
}

fn bench_dependency_resolution(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("dependency_resolution");

    for width in [8usize, 32, 128] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            b.to_async(&rt).iter(|| async move {
                let app = build_chain_app(width);
                RuntimeBuilder::new().root(app).build().await.unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dependency_resolution);
criterion_main!(benches);
