//! Scenario 1: a task depends on a resource and runs through a middleware
//! that rewrites its result.

mod common;

use serde::Deserialize;
use serde_json::Value;

use runcore::model::deps::{DependencyMap, DependencyRef, DependencySpecMap};
use runcore::model::middleware::{MiddlewareBuilder, MiddlewareKind};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::model::task::TaskBuilder;
use runcore::runtime::RuntimeBuilder;

struct Svc;

impl Svc {
    fn add(&self, a: i64, b: i64) -> i64 {
        a + b
    }
}

#[derive(Deserialize)]
struct SumInput {
    a: i64,
    b: i64,
}

#[tokio::test]
async fn run_task_returns_the_middleware_wrapped_sum() {
    let svc = ResourceBuilder::new("svc")
        .init::<(), Svc, (), _, _>(|_cfg, _deps, _scratch| async { Ok(Svc) })
        .build()
        .unwrap();

    let mw = MiddlewareBuilder::new("mw", MiddlewareKind::Task)
        .run::<(), _, _>(|args, _deps, _cfg: ()| async move {
            let result = (args.next)(args.value).await?;
            Ok(Value::String(format!("MW:{result}")))
        })
        .build()
        .unwrap();

    let mut deps: DependencySpecMap = DependencySpecMap::new();
    deps.insert("svc".to_string(), DependencyRef::resource("svc"));

    let sum = TaskBuilder::new("sum")
        .dependencies(runcore::model::deps::DependenciesDecl::Static(deps))
        .middleware(mw.attach())
        .run::<SumInput, i64, _, _>(|input, deps: DependencyMap| async move {
            let svc = deps.resource::<Svc>("svc")?;
            Ok(svc.add(input.a, input.b))
        })
        .build()
        .unwrap();

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(vec![
            Registerable::Resource(svc.with(()).unwrap()),
            Registerable::Task(sum),
            Registerable::Middleware(mw),
        ]))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    let runtime = RuntimeBuilder::new().root(app.with(()).unwrap()).build().await.unwrap();

    let result: String = runtime.run_task("sum", SumInput { a: 2, b: 3 }).await.unwrap();
    assert_eq!(result, "MW:5");
}
