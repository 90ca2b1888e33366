// Lox Native Functions
// Host functions installed as globals when a VM is created

use super::object::NativeFn;
use super::value::Value;
use std::sync::OnceLock;
use std::time::Instant;

/// Natives every VM starts with
pub const DEFAULT_NATIVES: &[(&str, NativeFn)] = &[("clock", clock)];

fn epoch() -> &'static Instant {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now)
}

/// Pin the clock epoch. Called when a VM is created.
pub fn start_clock() {
    epoch();
}

/// Seconds elapsed since the first VM was created
pub fn clock(_arg_count: usize, _args: &[Value]) -> Value {
    Value::Number(epoch().elapsed().as_secs_f64())
}
