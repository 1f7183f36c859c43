use std::collections::HashMap;
use std::sync::Mutex;

/// Seam around process environment variables (spec.md §6: `KRB5CCNAME`,
/// `AKLOG`/`KINIT_PROG`), so the maintenance loop's tests can inject values
/// instead of mutating real process state that every test shares. Modelled
/// on `ferrex-config`'s centralised configuration source
/// (`examples/Lowband21-ferrex/ferrex-config`) rather than scattering
/// `std::env::var`/`set_var` calls through the loop.
pub trait Environment {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

#[derive(Debug, Default)]
pub struct RealEnvironment;

impl Environment for RealEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn set(&self, key: &str, value: &str) {
        std::env::set_var(key, value);
    }
}

/// In-memory stand-in for tests: avoids races between parallel test threads
/// mutating the real process environment.
#[derive(Debug, Default)]
pub struct FakeEnvironment {
    vars: Mutex<HashMap<String, String>>,
}

impl Environment for FakeEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.vars.lock().unwrap().insert(key.to_string(), value.to_string());
    }
}
