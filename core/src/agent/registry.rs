use crate::agent::source::{StaticToolSource, ToolSource};
use crate::error::{Error, Result};
use crate::traits::{Tool, ToolArgs, ToolSpec};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Outcome of a registry refresh: names admitted and units skipped.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<Error>,
}

#[derive(Default)]
struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
    specs: Vec<ToolSpec>,
}

impl ToolSet {
    fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.specs
            .iter()
            .position(|spec| spec.name == name)
            .map(|idx| self.tools[idx].clone())
    }

    /// Admits `tool` unless its spec is malformed or its name is taken.
    fn admit(&mut self, unit: &str, tool: Arc<dyn Tool>) -> Result<()> {
        let spec = tool.spec();
        spec.check()
            .map_err(|reason| Error::registry_load(unit, reason))?;

        if self.specs.iter().any(|s| s.name == spec.name) {
            return Err(Error::registry_load(
                unit,
                format!("duplicate tool name '{}'", spec.name),
            ));
        }

        self.tools.push(tool);
        self.specs.push(spec);
        Ok(())
    }
}

/// The set of callable tools, shared by direct invocation and the model loop.
///
/// The active set sits behind an `Arc` that `refresh` swaps in one step, so a
/// reader either sees the previous set or the new one, never a partial one.
pub struct ToolRegistry {
    registered: Mutex<Vec<Arc<dyn Tool>>>,
    sources: Vec<Arc<dyn ToolSource>>,
    active: RwLock<Arc<ToolSet>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            registered: Mutex::new(Vec::new()),
            sources: Vec::new(),
            active: RwLock::new(Arc::new(ToolSet::default())),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn ToolSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Adds a tool that stays registered across refreshes.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<()> {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = ToolSet {
            tools: active.tools.clone(),
            specs: active.specs.clone(),
        };
        next.admit("registered", tool.clone())?;

        registered.push(tool);
        *active = Arc::new(next);
        Ok(())
    }

    /// Reloads every source and replaces the active set in one step.
    ///
    /// The registration lock is held until the swap, so a concurrent `register`
    /// lands either before the reload (and is part of it) or after the swap.
    pub fn refresh(&self) -> RefreshReport {
        let registered_guard = self
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let registered = StaticToolSource::new(registered_guard.clone());

        let mut next = ToolSet::default();
        let mut report = RefreshReport::default();

        let sources = std::iter::once(&registered as &dyn ToolSource)
            .chain(self.sources.iter().map(|s| s.as_ref()));

        for source in sources {
            for unit in source.load() {
                let admitted = unit.and_then(|tool| {
                    let name = tool.name().to_string();
                    next.admit(source.name(), tool).map(|()| name)
                });

                match admitted {
                    Ok(name) => report.loaded.push(name),
                    Err(e) => {
                        tracing::warn!(source = source.name(), "Skipping tool: {}", e);
                        report.skipped.push(e);
                    }
                }
            }
        }

        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        drop(registered_guard);

        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            "Tools loaded"
        );

        report
    }

    fn snapshot(&self) -> Arc<ToolSet> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn list_descriptors(&self) -> Vec<ToolSpec> {
        self.snapshot().specs.clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .specs
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.snapshot().find(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn count(&self) -> usize {
        self.snapshot().specs.len()
    }

    /// Validates `args` against the tool's schema, then runs it. The tool body
    /// is never reached when validation fails.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        let args = ToolArgs::resolve(&tool.spec(), args)?;
        tracing::debug!(tool = name, args = args.len(), "Invoking tool");

        tool.invoke(args).await.map_err(|e| Error::ToolFailed {
            tool: name.to_string(),
            message: format!("{e:#}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::source::ManifestToolSource;
    use crate::tools::{FavoriteDessertTool, GreetUserTool};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "Counts invocations"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "label": { "type": "string", "description": "Label" } },
                "required": ["label"]
            })
        }

        async fn invoke(&self, _args: ToolArgs) -> anyhow::Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!(null))
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "fail"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn invoke(&self, _args: ToolArgs) -> anyhow::Result<Value> {
            anyhow::bail!("disk on fire")
        }
    }

    fn registry() -> ToolRegistry {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(GreetUserTool)).unwrap();
        registry.register(Arc::new(FavoriteDessertTool)).unwrap();
        registry
    }

    #[tokio::test]
    async fn invoke_greet_user() {
        let result = registry()
            .invoke("greetUser", json!({"name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(result, json!({"greeting": "Hello, Ada!"}));
    }

    #[tokio::test]
    async fn invoke_accepts_string_parameters() {
        let result = registry()
            .invoke("favoriteDessert", json!(r#"{"dessert": "tiramisu"}"#))
            .await
            .unwrap();
        assert_eq!(result["greeting"], "Your favorite dessert is tiramisu!");
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = registry().invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(ref name) if name == "nope"));
    }

    #[tokio::test]
    async fn missing_parameter_never_reaches_tool() {
        let calls = Arc::new(AtomicUsize::new(0));
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(CountingTool {
                calls: calls.clone(),
            }))
            .unwrap();

        let err = registry.invoke("count", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::MissingParameter { ref parameter, .. } if parameter == "label"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        registry
            .invoke("count", json!({"label": "x"}))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tool_failure_carries_message() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(FailingTool)).unwrap();

        let err = registry.invoke("fail", json!({})).await.unwrap_err();
        match err {
            Error::ToolFailed { tool, message } => {
                assert_eq!(tool, "fail");
                assert!(message.contains("disk on fire"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_registration_rejected() {
        let registry = registry();
        assert!(registry.register(Arc::new(GreetUserTool)).is_err());
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn refresh_lists_one_descriptor_per_definition() {
        let tmp = TempDir::new().unwrap();
        for name in ["alpha", "beta"] {
            std::fs::write(
                tmp.path().join(format!("{name}.toml")),
                format!("name = \"{name}\"\ndescription = \"{name} tool\"\n"),
            )
            .unwrap();
        }
        std::fs::write(tmp.path().join("broken.toml"), "parameters = 3\n").unwrap();

        let registry = registry().with_source(Arc::new(ManifestToolSource::new(tmp.path())));
        let report = registry.refresh();

        assert_eq!(
            report.loaded,
            vec!["greetUser", "favoriteDessert", "alpha", "beta"]
        );
        assert_eq!(report.skipped.len(), 1);

        let descriptors = registry.list_descriptors();
        assert_eq!(descriptors.len(), 4);
        for name in ["greetUser", "favoriteDessert", "alpha", "beta"] {
            assert_eq!(descriptors.iter().filter(|d| d.name == name).count(), 1);
        }
    }

    #[test]
    fn refresh_picks_up_new_manifests_and_drops_removed() {
        let tmp = TempDir::new().unwrap();
        let registry =
            ToolRegistry::new().with_source(Arc::new(ManifestToolSource::new(tmp.path())));

        std::fs::write(tmp.path().join("one.toml"), "name = \"one\"\n").unwrap();
        registry.refresh();
        assert!(registry.contains("one"));

        let before = registry.get("one").unwrap();

        std::fs::remove_file(tmp.path().join("one.toml")).unwrap();
        std::fs::write(tmp.path().join("two.toml"), "name = \"two\"\n").unwrap();
        registry.refresh();

        assert!(!registry.contains("one"));
        assert!(registry.contains("two"));
        // Handles taken before the swap stay usable.
        assert_eq!(before.name(), "one");
    }

    /// Blocks inside `load` until released, to hold a refresh open.
    struct GatedSource {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl ToolSource for GatedSource {
        fn name(&self) -> &str {
            "gated"
        }

        fn load(&self) -> Vec<Result<Arc<dyn Tool>>> {
            let _ = self.entered.lock().unwrap().send(());
            let _ = self
                .release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
            Vec::new()
        }
    }

    #[test]
    fn register_during_refresh_is_not_lost() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let registry = Arc::new(ToolRegistry::new().with_source(Arc::new(GatedSource {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        })));

        let refreshing = {
            let registry = registry.clone();
            thread::spawn(move || registry.refresh())
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let registering = {
            let registry = registry.clone();
            thread::spawn(move || registry.register(Arc::new(GreetUserTool)))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        refreshing.join().unwrap();
        registering.join().unwrap().unwrap();

        assert!(registry.contains("greetUser"));
        registry.refresh();
        assert!(registry.contains("greetUser"));
    }

    #[test]
    fn manifest_cannot_shadow_registered_tool() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("greet.toml"), "name = \"greetUser\"\n").unwrap();

        let registry = registry().with_source(Arc::new(ManifestToolSource::new(tmp.path())));
        let report = registry.refresh();

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(registry.names(), vec!["greetUser", "favoriteDessert"]);
    }
}
