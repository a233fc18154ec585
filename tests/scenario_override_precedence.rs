//! Scenario 6: an override registered alongside a task's original
//! registration replaces its run body, regardless of other resources
//! registered in the same tree.

mod common;

use serde_json::{json, Value};

use runcore::error::RunnerError;
use runcore::model::deps::DependencyMap;
use runcore::model::overrides::{OverrideDecl, TaskOverride};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::model::task::TaskBuilder;
use runcore::runtime::RuntimeBuilder;

#[tokio::test]
async fn override_replaces_the_original_run_body() {
    let base = TaskBuilder::new("base")
        .run::<(), i64, _, _>(|_input, _deps: DependencyMap| async { Ok(1) })
        .build()
        .unwrap();

    let unrelated = ResourceBuilder::new("unrelated")
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    let mut override_decl = TaskOverride::new("base");
    override_decl.run = Some(std::sync::Arc::new(|_input: Value, _deps: DependencyMap| {
        Box::pin(async { Ok::<Value, RunnerError>(json!(2)) })
    }));

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(vec![
            Registerable::Task(base),
            Registerable::Resource(unrelated.with(()).unwrap()),
            Registerable::Override(std::sync::Arc::new(OverrideDecl::Task(override_decl))),
        ]))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    let runtime = RuntimeBuilder::new().root(app.with(()).unwrap()).build().await.unwrap();

    let result: i64 = runtime.run_task("base", ()).await.unwrap();
    assert_eq!(result, 2);
}
