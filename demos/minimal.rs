//! End-to-end demo: a `greet` task behind a logging middleware, run once
//! directly and once through a durable execution that sleeps in the
//! middle.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};

use runcore::durable::context::current;
use runcore::durable::memory_store::InMemoryDurableStore;
use runcore::durable::service::DurableService;
use runcore::error::RunnerError;
use runcore::infrastructure::config::ConfigLoader;
use runcore::infrastructure::logging;
use runcore::model::deps::{DependencyMap, TaskInvoker};
use runcore::model::middleware::{MiddlewareBuilder, MiddlewareKind};
use runcore::model::resource::{RegisterDecl, Registerable, ResourceBuilder};
use runcore::model::task::TaskBuilder;
use runcore::runtime::{RuntimeBuilder, RuntimeHandle};

#[derive(Parser)]
struct Args {
    /// Name to greet.
    #[arg(long, default_value = "world")]
    name: String,

    /// Run the greeting through a durable execution that sleeps first.
    #[arg(long)]
    durable: bool,
}

#[derive(Deserialize)]
struct GreetInput {
    name: String,
}

fn build_runtime_root() -> runcore::model::resource::ResourceWithConfig {
    let log_mw = MiddlewareBuilder::new("log", MiddlewareKind::Task)
        .run::<(), _, _>(|args, _deps, _cfg: ()| async move {
            tracing::info!(target = %args.target_id.as_str(), "task starting");
            let result = (args.next)(args.value).await?;
            tracing::info!(target = %args.target_id.as_str(), "task finished");
            Ok(result)
        })
        .build()
        .unwrap();

    let greet = TaskBuilder::new("greet")
        .middleware(log_mw.attach())
        .run::<GreetInput, String, _, _>(|input, _deps: DependencyMap| async move { Ok(format!("hello, {}!", input.name)) })
        .build()
        .unwrap();

    let app = ResourceBuilder::new("app")
        .register(RegisterDecl::Static(vec![Registerable::Task(greet), Registerable::Middleware(log_mw)]))
        .init::<(), (), (), _, _>(|_cfg, _deps, _scratch| async { Ok(()) })
        .build()
        .unwrap();

    app.with(()).unwrap()
}

/// `greet_durably` isn't registered with the graph runtime - the durable
/// service invokes it directly, and it sleeps once before calling into the
/// graph (`greet`) as one of its steps.
struct GreetWorkflow(Arc<RuntimeHandle>);

impl TaskInvoker for GreetWorkflow {
    fn invoke_task<'a>(
        &'a self,
        _id: &'a runcore::model::id::Id,
        input: Value,
    ) -> runcore::model::deps::BoxFuture<'a, Result<Value, RunnerError>> {
        Box::pin(async move {
            let ctx = current().expect("durable context installed by DurableService::execute");
            let name = input.get("name").and_then(Value::as_str).unwrap_or("world").to_string();
            ctx.sleep(10, Some("pause")).await?;
            let greet_id: runcore::model::id::Id = "greet".into();
            self.0.run_task_raw(&greet_id, json!({ "name": name }), None).await
        })
    }

    fn emit_event<'a>(
        &'a self,
        id: &'a runcore::model::id::Id,
        data: Value,
        source: Option<runcore::model::id::Id>,
    ) -> runcore::model::deps::BoxFuture<'a, Result<(), RunnerError>> {
        Box::pin(async move { self.0.emit_event(id.as_str().to_string(), data, source).await })
    }
}

async fn run_durable(runtime: Arc<RuntimeHandle>, name: String) -> Result<Value, RunnerError> {
    let workflow: Arc<dyn TaskInvoker> = Arc::new(GreetWorkflow(runtime));
    let store = Arc::new(InMemoryDurableStore::new());
    let service = DurableService::new(store, Arc::downgrade(&workflow));

    let execution_id = service.start_execution("greet_durably", json!({ "name": name }), 3).await?;
    match service.execute(&execution_id).await {
        Ok(value) => Ok(value),
        Err(RunnerError::Suspended(_)) => {
            tokio::time::sleep(Duration::from_millis(20)).await;
            service.execute(&execution_id).await
        }
        Err(err) => Err(err),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_subscriber(std::io::stdout);
    let config = ConfigLoader::load()?;
    let args = Args::parse();

    let runtime = Arc::new(RuntimeBuilder::new().root(build_runtime_root()).config(config).build().await?);

    if args.durable {
        let output = run_durable(runtime.clone(), args.name).await?;
        println!("{output}");
    } else {
        let greeting: String = runtime.run_task("greet", GreetInput { name: args.name }).await?;
        println!("{greeting}");
    }

    runtime.dispose().await?;
    Ok(())
}
