//! Background task spawning with explicit priority and stack size.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::spawn` creates a
//! FreeRTOS task with a known priority and stack.  On non-ESP targets,
//! falls back to a named `std::thread` with the requested stack.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks.  `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.  The supervisor is the
//! only spawner, which satisfies that constraint.

/// Spawn a worker thread with explicit priority and stack size.
///
/// The `name` parameter must be a null-terminated string (e.g. `"blink\0"`).
#[cfg(target_os = "espidf")]
pub fn spawn(
    name: &'static str,
    priority: u8,
    stack_kb: usize,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.prio = i32::from(priority);
        cfg.stack_size = (stack_kb * 1024) as i32;
        cfg.thread_name = name.as_ptr() as *const _;
        let ret = esp_idf_sys::esp_pthread_set_cfg(&cfg);
        assert!(
            ret == esp_idf_sys::ESP_OK as i32,
            "esp_pthread_set_cfg failed: {ret}"
        );
    }
    std::thread::spawn(f)
}

/// Host fallback: plain named thread, priority is ignored.
#[cfg(not(target_os = "espidf"))]
pub fn spawn(
    name: &'static str,
    _priority: u8,
    stack_kb: usize,
    f: impl FnOnce() + Send + 'static,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name(name.trim_end_matches('\0').to_string())
        .stack_size(stack_kb * 1024)
        .spawn(f)
        .expect("thread spawn failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawned_thread_runs_to_completion() {
        let (tx, rx) = std::sync::mpsc::channel();
        let handle = spawn("worker-test\0", 5, 8, move || {
            tx.send(42u8).unwrap();
        });
        assert_eq!(rx.recv().unwrap(), 42);
        handle.join().unwrap();
    }
}
