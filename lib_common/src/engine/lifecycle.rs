//! # Lifecycle Orchestrator
//!
//! Starts a declarative graph of named components in dependency order and
//! stops them in exact reverse order.
//!
//! ## Rules:
//!
//! - A component starts only after every component it depends on has started
//!   and its handle is available through [`Dependencies`].
//! - Ties in the topological order are broken by declaration order, so the
//!   start order is deterministic.
//! - `start_all` and `stop_all` skip components that are already started or
//!   already stopped.
//! - A failing `start` aborts startup. Components started before it stay
//!   running; call `stop_all` to tear them down.

use std::any::{type_name, Any};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;

/// Type-erased handle returned by a component's `start`.
pub type Handle = Arc<dyn Any + Send + Sync>;

type StartFn = Box<dyn Fn(&Dependencies<'_>) -> anyhow::Result<Handle> + Send + Sync>;
type StopFn = Box<dyn Fn(&Handle) + Send + Sync>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("component `{0}` is declared more than once")]
    Duplicate(String),

    #[error("component `{component}` depends on unknown component `{dependency}`")]
    UnknownDependency { component: String, dependency: String },

    #[error("dependency cycle between components: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("component `{component}` did not declare a dependency on `{dependency}`")]
    UndeclaredDependency { component: String, dependency: String },

    #[error("component `{component}` is not started")]
    NotStarted { component: String },

    #[error("handle of component `{component}` is not a `{expected}`")]
    HandleType {
        component: String,
        expected: &'static str,
    },

    #[error("component `{component}` failed to start: {source}")]
    StartFailed {
        component: String,
        #[source]
        source: anyhow::Error,
    },
}

/// # Component
///
/// One node of the graph: a name, the names it depends on, and its start/stop
/// actions.
pub struct Component {
    name: String,
    depends_on: Vec<String>,
    start: StartFn,
    stop: StopFn,
}

impl Component {
    /// Declares a component whose handle is an `Arc<T>`.
    pub fn new<T, S, P>(name: impl Into<String>, depends_on: &[&str], start: S, stop: P) -> Self
    where
        T: Send + Sync + 'static,
        S: Fn(&Dependencies<'_>) -> anyhow::Result<Arc<T>> + Send + Sync + 'static,
        P: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            start: Box::new(move |deps| start(deps).map(|handle| handle as Handle)),
            stop: Box::new(move |handle| {
                if let Some(typed) = handle.downcast_ref::<T>() {
                    stop(typed);
                }
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// Read-only view of the handles a starting component declared it needs.
pub struct Dependencies<'a> {
    component: &'a str,
    declared: &'a [String],
    handles: &'a HashMap<String, Handle>,
}

impl Dependencies<'_> {
    /// Returns the handle of declared dependency `name` as an `Arc<T>`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, LifecycleError> {
        if !self.declared.iter().any(|d| d == name) {
            return Err(LifecycleError::UndeclaredDependency {
                component: self.component.to_string(),
                dependency: name.to_string(),
            });
        }
        downcast_handle(name, self.handles.get(name))
    }
}

/// # Lifecycle Orchestrator
#[derive(Default)]
pub struct LifecycleOrchestrator {
    components: Vec<Component>,
    handles: HashMap<String, Handle>,
    started: Vec<String>,
}

impl LifecycleOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component to the graph. Dependencies are checked at start time,
    /// so components may be declared in any order.
    pub fn register(&mut self, component: Component) -> Result<&mut Self, LifecycleError> {
        if self.components.iter().any(|c| c.name == component.name) {
            return Err(LifecycleError::Duplicate(component.name));
        }
        self.components.push(component);
        Ok(self)
    }

    /// Resolves the topological start order.
    pub fn start_order(&self) -> Result<Vec<String>, LifecycleError> {
        let index: HashMap<&str, usize> = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();

        let mut indegree = vec![0usize; self.components.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.components.len()];
        for (i, component) in self.components.iter().enumerate() {
            for dependency in &component.depends_on {
                let Some(&d) = index.get(dependency.as_str()) else {
                    return Err(LifecycleError::UnknownDependency {
                        component: component.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                indegree[i] += 1;
                dependents[d].push(i);
            }
        }

        // Kahn's algorithm; the ordered set keeps declaration order among ready nodes.
        let mut ready: BTreeSet<usize> = (0..indegree.len()).filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.components.len());
        while let Some(next) = ready.pop_first() {
            order.push(next);
            for &dependent in &dependents[next] {
                indegree[dependent] -= 1;
                if indegree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() != self.components.len() {
            let stuck = (0..self.components.len())
                .filter(|i| indegree[*i] > 0)
                .map(|i| self.components[i].name.clone())
                .collect();
            return Err(LifecycleError::Cycle(stuck));
        }

        Ok(order.into_iter().map(|i| self.components[i].name.clone()).collect())
    }

    /// # Start All
    ///
    /// Starts every component that is not running yet, in topological order.
    pub fn start_all(&mut self) -> Result<(), LifecycleError> {
        let order = self.start_order()?;

        for name in order {
            if self.handles.contains_key(&name) {
                continue;
            }
            let Some(component) = self.components.iter().find(|c| c.name == name) else {
                continue;
            };

            let deps = Dependencies {
                component: &component.name,
                declared: &component.depends_on,
                handles: &self.handles,
            };
            let handle = (component.start)(&deps).map_err(|source| {
                tracing::error!(component = %name, error = %source, "Component failed to start.");
                LifecycleError::StartFailed {
                    component: name.clone(),
                    source,
                }
            })?;

            tracing::info!(component = %name, "Component started.");
            self.handles.insert(name.clone(), handle);
            self.started.push(name);
        }
        Ok(())
    }

    /// # Stop All
    ///
    /// Stops every started component in reverse start order. Safe to call
    /// after a failed `start_all` and safe to call repeatedly.
    pub fn stop_all(&mut self) {
        while let Some(name) = self.started.pop() {
            let Some(handle) = self.handles.remove(&name) else {
                continue;
            };
            if let Some(component) = self.components.iter().find(|c| c.name == name) {
                (component.stop)(&handle);
                tracing::info!(component = %name, "Component stopped.");
            }
        }
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.handles.contains_key(name)
    }

    /// Names of the running components, in the order they were started.
    pub fn started(&self) -> &[String] {
        &self.started
    }

    /// Typed access to a started component's handle.
    pub fn handle<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>, LifecycleError> {
        downcast_handle(name, self.handles.get(name))
    }
}

impl Drop for LifecycleOrchestrator {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn downcast_handle<T: Send + Sync + 'static>(name: &str, handle: Option<&Handle>) -> Result<Arc<T>, LifecycleError> {
    let handle = handle.ok_or_else(|| LifecycleError::NotStarted {
        component: name.to_string(),
    })?;
    Arc::clone(handle)
        .downcast::<T>()
        .map_err(|_| LifecycleError::HandleType {
            component: name.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recorder {
        name: String,
    }

    fn recorder(name: &'static str, deps: &[&str], log: &Log) -> Component {
        let start_log = Arc::clone(log);
        let stop_log = Arc::clone(log);
        Component::new(
            name,
            deps,
            move |_| {
                start_log.lock().unwrap().push(format!("start {name}"));
                Ok(Arc::new(Recorder {
                    name: name.to_string(),
                }))
            },
            move |p: &Recorder| stop_log.lock().unwrap().push(format!("stop {}", p.name)),
        )
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn starts_in_dependency_order_and_stops_in_reverse() {
        let log: Log = Arc::default();
        let mut graph = LifecycleOrchestrator::new();
        graph
            .register(recorder("heartbeat", &["gateway", "state"], &log))
            .unwrap()
            .register(recorder("watcher", &["gateway", "state"], &log))
            .unwrap()
            .register(recorder("state", &[], &log))
            .unwrap()
            .register(recorder("gateway", &[], &log))
            .unwrap();

        assert_eq!(graph.start_order().unwrap(), vec!["state", "gateway", "heartbeat", "watcher"]);

        graph.start_all().unwrap();
        graph.stop_all();
        assert_eq!(
            entries(&log),
            vec![
                "start state",
                "start gateway",
                "start heartbeat",
                "start watcher",
                "stop watcher",
                "stop heartbeat",
                "stop gateway",
                "stop state",
            ]
        );
    }

    #[test]
    fn start_and_stop_all_are_idempotent() {
        let log: Log = Arc::default();
        let mut graph = LifecycleOrchestrator::new();
        graph.register(recorder("a", &[], &log)).unwrap();

        graph.start_all().unwrap();
        graph.start_all().unwrap();
        assert!(graph.is_started("a"));
        graph.stop_all();
        graph.stop_all();
        assert!(!graph.is_started("a"));
        assert_eq!(entries(&log), vec!["start a", "stop a"]);
    }

    #[test]
    fn dependents_receive_dependency_handles() {
        let mut graph = LifecycleOrchestrator::new();
        graph
            .register(Component::new("counter", &[], |_| Ok(Arc::new(AtomicUsize::new(41))), |_| {}))
            .unwrap()
            .register(Component::new(
                "user",
                &["counter"],
                |deps| {
                    let counter = deps.get::<AtomicUsize>("counter")?;
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(counter)
                },
                |_| {},
            ))
            .unwrap();

        graph.start_all().unwrap();
        let counter = graph.handle::<AtomicUsize>("counter").unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 42);
        assert!(matches!(
            graph.handle::<String>("counter"),
            Err(LifecycleError::HandleType { .. })
        ));
    }

    #[test]
    fn undeclared_dependency_access_is_rejected() {
        let mut graph = LifecycleOrchestrator::new();
        graph
            .register(Component::new("a", &[], |_| Ok(Arc::new(1u8)), |_| {}))
            .unwrap()
            .register(Component::new(
                "b",
                &[],
                |deps| Ok(deps.get::<u8>("a")?),
                |_| {},
            ))
            .unwrap();

        let err = graph.start_all().unwrap_err();
        assert!(matches!(err, LifecycleError::StartFailed { ref component, .. } if component == "b"));
    }

    #[test]
    fn failed_start_aborts_and_leaves_earlier_components_running() {
        let log: Log = Arc::default();
        let mut graph = LifecycleOrchestrator::new();
        graph
            .register(recorder("first", &[], &log))
            .unwrap()
            .register(Component::new::<(), _, _>(
                "broken",
                &["first"],
                |_| Err(anyhow::anyhow!("port in use")),
                |_| {},
            ))
            .unwrap()
            .register(recorder("never", &["broken"], &log))
            .unwrap();

        let err = graph.start_all().unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(graph.is_started("first"));
        assert!(!graph.is_started("never"));
        assert_eq!(graph.started(), ["first".to_string()]);

        graph.stop_all();
        assert_eq!(entries(&log), vec!["start first", "stop first"]);
    }

    #[test]
    fn graph_errors_are_reported() {
        let log: Log = Arc::default();

        let mut duplicate = LifecycleOrchestrator::new();
        duplicate.register(recorder("a", &[], &log)).unwrap();
        assert!(matches!(
            duplicate.register(recorder("a", &[], &log)),
            Err(LifecycleError::Duplicate(name)) if name == "a"
        ));

        let mut unknown = LifecycleOrchestrator::new();
        unknown.register(recorder("a", &["missing"], &log)).unwrap();
        assert!(matches!(
            unknown.start_all(),
            Err(LifecycleError::UnknownDependency { .. })
        ));

        let mut cycle = LifecycleOrchestrator::new();
        cycle
            .register(recorder("a", &["b"], &log))
            .unwrap()
            .register(recorder("b", &["a"], &log))
            .unwrap()
            .register(recorder("c", &[], &log))
            .unwrap();
        match cycle.start_all() {
            Err(LifecycleError::Cycle(names)) => assert_eq!(names, vec!["a", "b"]),
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn drop_stops_running_components() {
        let log: Log = Arc::default();
        {
            let mut graph = LifecycleOrchestrator::new();
            graph.register(recorder("a", &[], &log)).unwrap();
            graph.start_all().unwrap();
        }
        assert_eq!(entries(&log), vec!["start a", "stop a"]);
    }
}
