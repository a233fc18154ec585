//! Scenario 2: hooks of increasing `order` run strictly in order, and a
//! wildcard hook always runs last among hooks that tie on ordering here.

mod common;

use serde_json::json;

use runcore::model::event::EventBuilder;
use runcore::model::hook::{HookBuilder, HookTarget};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::runtime::RuntimeBuilder;

use common::Recorder;

#[tokio::test]
async fn hooks_fire_in_order_then_wildcard_fires_last() {
    let recorder = ResourceBuilder::new("recorder")
        .init::<(), Recorder, (), _, _>(|_cfg, _deps, _scratch| async { Ok(Recorder::default()) })
        .build()
        .unwrap();

    let event = EventBuilder::new("e").build();

    let h1 = HookBuilder::new("h1", HookTarget::Events(vec!["e".into()]))
        .order(0)
        .dependencies(runcore::model::deps::DependenciesDecl::Static({
            let mut m = runcore::model::deps::DependencySpecMap::new();
            m.insert("recorder".to_string(), runcore::model::deps::DependencyRef::resource("recorder"));
            m
        }))
        .run(|_emission, deps| async move {
            deps.resource::<Recorder>("recorder")?.push("h1");
            Ok(())
        })
        .build()
        .unwrap();

    let h2 = HookBuilder::new("h2", HookTarget::Events(vec!["e".into()]))
        .order(5)
        .dependencies(runcore::model::deps::DependenciesDecl::Static({
            let mut m = runcore::model::deps::DependencySpecMap::new();
            m.insert("recorder".to_string(), runcore::model::deps::DependencyRef::resource("recorder"));
            m
        }))
        .run(|_emission, deps| async move {
            deps.resource::<Recorder>("recorder")?.push("h2");
            Ok(())
        })
        .build()
        .unwrap();

    let hw = HookBuilder::new("hw", HookTarget::Wildcard)
        .dependencies(runcore::model::deps::DependenciesDecl::Static({
            let mut m = runcore::model::deps::DependencySpecMap::new();
            m.insert("recorder".to_string(), runcore::model::deps::DependencyRef::resource("recorder"));
            m
        }))
        .run(|_emission, deps| async move {
            deps.resource::<Recorder>("recorder")?.push("hw");
            Ok(())
        })
        .build()
        .unwrap();

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(vec![
            Registerable::Resource(recorder.with(()).unwrap()),
            Registerable::Event(event),
            Registerable::Hook(h1),
            Registerable::Hook(h2),
            Registerable::Hook(hw),
        ]))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    let runtime = RuntimeBuilder::new().root(app.with(()).unwrap()).build().await.unwrap();

    runtime.emit_event("e", json!({"x": 1}), None).await.unwrap();

    let order: Vec<String> = runtime.get_resource_value::<Recorder>("recorder").await.unwrap().snapshot();
    assert_eq!(order, vec!["h1".to_string(), "h2".to_string(), "hw".to_string()]);
}
