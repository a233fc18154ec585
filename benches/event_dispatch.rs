//! Measures two-pass hook dispatch throughput as the number of hooks
//! attached to a single event grows.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use runcore::model::event::EventBuilder;
use runcore::model::hook::{HookBuilder, HookTarget};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::runtime::RuntimeBuilder;

async fn build_runtime_with_hooks(hook_count: usize) -> runcore::runtime::RuntimeHandle {
    let event = EventBuilder::new("e").build();

    let mut registerables = vec![Registerable::Event(event)];
    for i in 0..hook_count {
        let hook = HookBuilder::new(format!("h{i}"), HookTarget::Events(vec!["e".into()]))
            .order(i as i32 % 8)
            .run(|_emission, _deps| async move { Ok(()) })
            .build()
            .unwrap();
        registerables.push(Registerable::Hook(hook));
    }

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(registerables))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    RuntimeBuilder::new().root(app.with(()).unwrap()).build().await.unwrap()
}

fn bench_event_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("event_dispatch");

    for hook_count in [8usize, 32, 128] {
        let runtime = Arc::new(rt.block_on(build_runtime_with_hooks(hook_count)));
        group.bench_with_input(BenchmarkId::from_parameter(hook_count), &runtime, |b, runtime| {
            b.to_async(&rt).iter(|| async move {
                runtime.emit_event("e", json!({"x": 1}), None).await.unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_event_dispatch);
criterion_main!(benches);
