#![allow(dead_code)]

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use swarm::{Agent, ScriptedAgent, Swarm};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn env_lock() -> MutexGuard<'static, ()> {
    match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
        Ok(g) => g,
        // A test that panicked while holding the lock must not wedge the rest.
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// RAII guard for test-only env var mutation, serialized behind a global lock.
#[must_use]
pub struct EnvVarGuard {
    key: String,
    old: Option<OsString>,
    _lock: MutexGuard<'static, ()>,
}

impl EnvVarGuard {
    pub fn set<K: Into<String>, V: AsRef<OsStr>>(key: K, value: V) -> Self {
        let key = key.into();
        let lock = env_lock();
        let old = env::var_os(&key);
        env::set_var(&key, value);
        Self {
            key,
            old,
            _lock: lock,
        }
    }

    pub fn unset<K: Into<String>>(key: K) -> Self {
        let key = key.into();
        let lock = env_lock();
        let old = env::var_os(&key);
        env::remove_var(&key);
        Self {
            key,
            old,
            _lock: lock,
        }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        match &self.old {
            Some(v) => env::set_var(&self.key, v),
            None => env::remove_var(&self.key),
        }
    }
}

pub fn unique_test_temp_dir(prefix: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let dir = env::temp_dir().join(format!("swarm-{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

pub fn write_spec(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("swarm.yaml");
    std::fs::write(&path, yaml).expect("write spec yaml");
    path
}

pub fn scripted(name: &str, responses: &[&str]) -> Arc<ScriptedAgent> {
    Arc::new(ScriptedAgent::new(name).with_responses(responses.iter().copied()))
}

/// Register each agent in order.
pub fn swarm_of(agents: &[&Arc<ScriptedAgent>]) -> Swarm {
    let swarm = Swarm::new();
    for a in agents {
        swarm.add_agent(Arc::clone(*a) as Arc<dyn Agent>);
    }
    swarm
}
