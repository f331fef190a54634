//! Quadrotor task catalogue and registry
//!
//! All built-in tasks share the simulator's spaces: a 7-dimensional
//! observation (position in a 300-unit cube, orientation quaternion) and a
//! 6-dimensional action (force and torque, 25 units each way). Agents learn
//! from the position only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quad_rl_core::{BoxSpace, ContinuousSpace, RLError, Result, TaskSpec};

/// Side of the cube the quadrotor flies in
pub const CUBE_SIZE: f64 = 300.0;
/// Largest force along any axis
pub const MAX_FORCE: f64 = 25.0;
/// Largest torque about any axis
pub const MAX_TORQUE: f64 = 25.0;

type TaskConstructor = Box<dyn Fn() -> Result<TaskSpec> + Send + Sync>;

lazy_static::lazy_static! {
    static ref REGISTRY: Arc<Mutex<TaskRegistry>> = Arc::new(Mutex::new(TaskRegistry::with_builtins()));
}

/// Named task constructors
pub struct TaskRegistry {
    tasks: HashMap<String, TaskConstructor>,
}

impl TaskRegistry {
    /// Registry holding `takeoff`, `hover` and `landing`
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            tasks: HashMap::new(),
        };
        registry.register("takeoff", takeoff);
        registry.register("hover", hover);
        registry.register("landing", landing);
        registry
    }

    /// Register a task, replacing any task of the same name
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<TaskSpec> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Box::new(constructor));
    }

    /// Build a task by name
    pub fn make(&self, name: &str) -> Result<TaskSpec> {
        self.tasks
            .get(name)
            .ok_or_else(|| RLError::Environment(format!("Unknown task: {name}")))
            .and_then(|constructor| constructor())
    }

    /// Registered task names, sorted
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Register a task globally
pub fn register_task<F>(name: impl Into<String>, constructor: F) -> Result<()>
where
    F: Fn() -> Result<TaskSpec> + Send + Sync + 'static,
{
    REGISTRY
        .lock()
        .map_err(|_| RLError::Environment("task registry lock poisoned".into()))?
        .register(name, constructor);
    Ok(())
}

/// Build a globally registered task by name
pub fn make_task(name: &str) -> Result<TaskSpec> {
    REGISTRY
        .lock()
        .map_err(|_| RLError::Environment("task registry lock poisoned".into()))?
        .make(name)
}

/// Names of all globally registered tasks
pub fn task_names() -> Result<Vec<String>> {
    Ok(REGISTRY
        .lock()
        .map_err(|_| RLError::Environment("task registry lock poisoned".into()))?
        .list())
}

/// Rise from the ground to a target height
pub fn takeoff() -> Result<TaskSpec> {
    quadrotor_task("takeoff")
}

/// Hold a target height
pub fn hover() -> Result<TaskSpec> {
    quadrotor_task("hover")
}

/// Descend gently to the ground
pub fn landing() -> Result<TaskSpec> {
    quadrotor_task("landing")
}

fn quadrotor_task(name: &str) -> Result<TaskSpec> {
    let half = CUBE_SIZE / 2.0;
    let observation_space = BoxSpace::new(
        vec![-half, -half, 0.0, -1.0, -1.0, -1.0, -1.0],
        vec![half, half, CUBE_SIZE, 1.0, 1.0, 1.0, 1.0],
    )?;
    let action_space = ContinuousSpace::new(
        vec![-MAX_FORCE, -MAX_FORCE, -MAX_FORCE, -MAX_TORQUE, -MAX_TORQUE, -MAX_TORQUE],
        vec![MAX_FORCE, MAX_FORCE, MAX_FORCE, MAX_TORQUE, MAX_TORQUE, MAX_TORQUE],
    )?;
    TaskSpec::new(name, observation_space, action_space, 0..3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tasks_share_the_quadrotor_spaces() {
        for task in [takeoff().unwrap(), hover().unwrap(), landing().unwrap()] {
            assert_eq!(task.observation_space.dim(), 7);
            assert_eq!(task.action_dim(), 6);
            assert_eq!(task.state_size(), 3);
            assert_eq!(task.action_space.high[2], MAX_FORCE);
            assert_eq!(task.observation_space.low[2], 0.0);
        }
    }

    #[test]
    fn registry_builds_by_name() {
        let registry = TaskRegistry::with_builtins();
        assert_eq!(registry.list(), vec!["hover", "landing", "takeoff"]);
        assert_eq!(registry.make("hover").unwrap().name, "hover");
        assert!(matches!(registry.make("loop"), Err(RLError::Environment(_))));
    }

    #[test]
    fn custom_tasks_can_be_registered_globally() {
        register_task("low_hover", || {
            let mut task = hover()?;
            task.name = "low_hover".into();
            Ok(task)
        })
        .unwrap();
        assert_eq!(make_task("low_hover").unwrap().name, "low_hover");
        assert!(task_names().unwrap().contains(&"takeoff".to_string()));
    }
}
