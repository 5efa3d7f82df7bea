//! The dependency-ordered component container.

use crate::component::{Component, ComponentState};
use crate::error::LifecycleError;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

type Factory = Box<dyn FnMut() -> Result<Box<dyn Component>, LifecycleError>>;
type Handle = Rc<RefCell<Box<dyn Component>>>;

/// A component's registration: its name, the names it depends on, and
/// (for `@Singleton`-tagged component types) the shared type key that
/// lets two differently-named registrations resolve to one instance.
pub struct Registration {
    pub name: String,
    pub dependencies: Vec<String>,
    pub singleton_type: Option<String>,
}

impl Registration {
    pub fn new(name: impl Into<String>) -> Self {
        Registration {
            name: name.into(),
            dependencies: Vec::new(),
            singleton_type: None,
        }
    }

    pub fn depends_on(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dependencies = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn singleton(mut self, type_key: impl Into<String>) -> Self {
        self.singleton_type = Some(type_key.into());
        self
    }
}

struct Entry {
    registration: Registration,
    factory: Factory,
}

pub struct Container {
    entries: Vec<Entry>,
    order: Vec<String>,
    instances: HashMap<String, Handle>,
    singleton_cache: HashMap<String, Handle>,
    states: HashMap<String, ComponentState>,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    pub fn new() -> Self {
        Container {
            entries: Vec::new(),
            order: Vec::new(),
            instances: HashMap::new(),
            singleton_cache: HashMap::new(),
            states: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, registration: Registration, factory: F) -> Result<(), LifecycleError>
    where
        F: FnMut() -> Result<Box<dyn Component>, LifecycleError> + 'static,
    {
        if self.entries.iter().any(|e| e.registration.name == registration.name) {
            return Err(LifecycleError::DuplicateRegistration(registration.name));
        }
        self.states
            .insert(registration.name.clone(), ComponentState::Uninitialized);
        self.entries.push(Entry {
            registration,
            factory: Box::new(factory),
        });
        Ok(())
    }

    pub fn state(&self, name: &str) -> Option<ComponentState> {
        self.states.get(name).copied()
    }

    /// Returns the shared handle for `name`, downcastable to a concrete
    /// component type via `Component::as_any`.
    pub fn get(&self, name: &str) -> Option<Handle> {
        self.instances.get(name).cloned()
    }

    /// Topologically sorts the registered components (Kahn's algorithm,
    /// leaves first) and runs `init()` on each in that order. If any
    /// factory or `init()` fails, already-initialized components are torn
    /// down (`stop()`, reverse init order) and the error is returned —
    /// the whole graph aborts together.
    pub fn initialize_all(&mut self) -> Result<(), LifecycleError> {
        let order = self.topological_order()?;

        let mut initialized: Vec<String> = Vec::new();
        for name in &order {
            match self.initialize_one(name) {
                Ok(()) => initialized.push(name.clone()),
                Err(err) => {
                    for done in initialized.iter().rev() {
                        if let Some(handle) = self.instances.get(done) {
                            let _ = handle.borrow_mut().stop();
                        }
                        self.states.insert(done.clone(), ComponentState::Stopped);
                    }
                    return Err(err);
                }
            }
        }
        self.order = order;
        Ok(())
    }

    fn initialize_one(&mut self, name: &str) -> Result<(), LifecycleError> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.registration.name == name)
            .expect("name came from this container's own topological_order");

        if let Some(singleton_type) = self.entries[idx].registration.singleton_type.clone() {
            if let Some(existing) = self.singleton_cache.get(&singleton_type) {
                self.instances.insert(name.to_string(), existing.clone());
                self.states.insert(name.to_string(), ComponentState::Initialized);
                return Ok(());
            }
        }

        let component = (self.entries[idx].factory)().map_err(|err| LifecycleError::FactoryFailure {
            name: name.to_string(),
            reason: err.to_string(),
        })?;
        let handle: Handle = Rc::new(RefCell::new(component));
        handle
            .borrow_mut()
            .init()
            .map_err(|err| LifecycleError::FactoryFailure {
                name: name.to_string(),
                reason: err.to_string(),
            })?;

        if let Some(singleton_type) = self.entries[idx].registration.singleton_type.clone() {
            self.singleton_cache.insert(singleton_type, handle.clone());
        }
        self.instances.insert(name.to_string(), handle);
        self.states.insert(name.to_string(), ComponentState::Initialized);
        Ok(())
    }

    fn topological_order(&self) -> Result<Vec<String>, LifecycleError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for entry in &self.entries {
            in_degree.entry(&entry.registration.name).or_insert(0);
            for dep in &entry.registration.dependencies {
                *in_degree.entry(&entry.registration.name).or_insert(0) += 1;
                dependents.entry(dep.as_str()).or_default().push(&entry.registration.name);
            }
        }

        let mut ready: VecDeque<&str> = self
            .entries
            .iter()
            .map(|e| e.registration.name.as_str())
            .filter(|name| in_degree[name] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.entries.len());
        let mut seen: HashSet<&str> = HashSet::new();
        while let Some(name) = ready.pop_front() {
            if !seen.insert(name) {
                continue;
            }
            order.push(name.to_string());
            if let Some(deps) = dependents.get(name) {
                for &dependent in deps {
                    let degree = in_degree.get_mut(dependent).unwrap();
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
        }

        if order.len() != self.entries.len() {
            let remaining: Vec<String> = self
                .entries
                .iter()
                .map(|e| e.registration.name.clone())
                .filter(|name| !order.contains(name))
                .collect();
            return Err(LifecycleError::DependencyCycle(remaining));
        }
        Ok(order)
    }

    fn require(&self, name: &str) -> Result<&Handle, LifecycleError> {
        self.instances
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownComponent(name.to_string()))
    }

    fn transition(
        &mut self,
        name: &str,
        expected: &[ComponentState],
        to: ComponentState,
        attempted: &'static str,
        run: impl FnOnce(&mut dyn Component) -> Result<(), LifecycleError>,
    ) -> Result<(), LifecycleError> {
        let from = *self
            .states
            .get(name)
            .ok_or_else(|| LifecycleError::UnknownComponent(name.to_string()))?;
        if !expected.contains(&from) {
            return Err(LifecycleError::IllegalTransition {
                name: name.to_string(),
                from,
                attempted,
            });
        }
        let handle = self.require(name)?.clone();
        run(&mut **handle.borrow_mut())?;
        self.states.insert(name.to_string(), to);
        Ok(())
    }

    pub fn start(&mut self, name: &str) -> Result<(), LifecycleError> {
        self.transition(
            name,
            &[ComponentState::Initialized],
            ComponentState::Active,
            "start",
            Component::start,
        )
    }

    pub fn start_standby(&mut self, name: &str) -> Result<(), LifecycleError> {
        self.transition(
            name,
            &[ComponentState::Initialized],
            ComponentState::Standby,
            "start_standby",
            Component::start_standby,
        )
    }

    pub fn become_active(&mut self, name: &str) -> Result<(), LifecycleError> {
        self.transition(
            name,
            &[ComponentState::Standby],
            ComponentState::Active,
            "become_active",
            Component::become_active,
        )
    }

    pub fn become_standby(&mut self, name: &str) -> Result<(), LifecycleError> {
        self.transition(
            name,
            &[ComponentState::Active],
            ComponentState::Standby,
            "become_standby",
            Component::become_standby,
        )
    }

    /// Stops every initialized component in reverse dependency order.
    pub fn stop_all(&mut self) -> Result<(), LifecycleError> {
        let order = self.order.clone();
        for name in order.iter().rev() {
            let state = self.states.get(name).copied().unwrap_or(ComponentState::Stopped);
            if state == ComponentState::Stopped || state == ComponentState::Uninitialized {
                continue;
            }
            self.transition(name, &[state], ComponentState::Stopped, "stop", Component::stop)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        log: Rc<RefCell<Vec<String>>>,
        label: String,
    }

    impl Component for Recorder {
        fn init(&mut self) -> Result<(), LifecycleError> {
            self.log.borrow_mut().push(format!("init:{}", self.label));
            Ok(())
        }

        fn start(&mut self) -> Result<(), LifecycleError> {
            self.log.borrow_mut().push(format!("start:{}", self.label));
            Ok(())
        }

        fn stop(&mut self) -> Result<(), LifecycleError> {
            self.log.borrow_mut().push(format!("stop:{}", self.label));
            Ok(())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    struct Failing;

    impl Component for Failing {
        fn init(&mut self) -> Result<(), LifecycleError> {
            Err(LifecycleError::UnknownComponent("boom".into()))
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    }

    #[test]
    fn initializes_leaves_before_dependents() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut container = Container::new();
        container
            .register(Registration::new("log_store"), {
                let log = log.clone();
                move || Ok(Box::new(Recorder { log: log.clone(), label: "log_store".into() }) as Box<dyn Component>)
            })
            .unwrap();
        container
            .register(Registration::new("session").depends_on(["log_store"]), {
                let log = log.clone();
                move || Ok(Box::new(Recorder { log: log.clone(), label: "session".into() }) as Box<dyn Component>)
            })
            .unwrap();

        container.initialize_all().unwrap();
        assert_eq!(*log.borrow(), vec!["init:log_store", "init:session"]);
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let mut container = Container::new();
        container
            .register(Registration::new("a").depends_on(["b"]), || {
                Ok(Box::new(Failing) as Box<dyn Component>)
            })
            .unwrap();
        container
            .register(Registration::new("b").depends_on(["a"]), || {
                Ok(Box::new(Failing) as Box<dyn Component>)
            })
            .unwrap();

        let err = container.initialize_all().unwrap_err();
        assert!(matches!(err, LifecycleError::DependencyCycle(_)));
    }

    #[test]
    fn factory_failure_tears_down_already_initialized_components() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut container = Container::new();
        container
            .register(Registration::new("first"), {
                let log = log.clone();
                move || Ok(Box::new(Recorder { log: log.clone(), label: "first".into() }) as Box<dyn Component>)
            })
            .unwrap();
        container
            .register(Registration::new("second").depends_on(["first"]), || {
                Ok(Box::new(Failing) as Box<dyn Component>)
            })
            .unwrap();

        let err = container.initialize_all().unwrap_err();
        assert!(matches!(err, LifecycleError::FactoryFailure { .. }));
        assert_eq!(*log.borrow(), vec!["init:first", "stop:first"]);
    }

    #[test]
    fn singleton_type_is_shared_across_registrations() {
        let mut container = Container::new();
        container
            .register(Registration::new("a").singleton("shared"), || {
                Ok(Box::new(Failing) as Box<dyn Component>)
            })
            .unwrap();
        container
            .register(Registration::new("b").singleton("shared"), || {
                panic!("singleton factory must not run twice")
            })
            .unwrap();

        // "a"'s factory returns a `Failing`, whose `init` errors — swap in
        // a non-failing recorder instead so both registrations succeed.
        let mut container = Container::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        container
            .register(Registration::new("a").singleton("shared"), {
                let log = log.clone();
                move || Ok(Box::new(Recorder { log: log.clone(), label: "shared".into() }) as Box<dyn Component>)
            })
            .unwrap();
        container
            .register(Registration::new("b").singleton("shared"), || {
                panic!("singleton factory must not run twice")
            })
            .unwrap();
        container.initialize_all().unwrap();

        let a = container.get("a").unwrap();
        let b = container.get("b").unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(*log.borrow(), vec!["init:shared"]);
    }

    #[test]
    fn start_from_uninitialized_is_illegal() {
        let mut container = Container::new();
        container
            .register(Registration::new("a"), || Ok(Box::new(Failing) as Box<dyn Component>))
            .unwrap();
        let err = container.start("a").unwrap_err();
        assert!(matches!(err, LifecycleError::IllegalTransition { .. }));
    }
}
