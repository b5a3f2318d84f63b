//! Smoke tests run against every backend compiled for this target

use super::*;
use crate::sync::{ConditionVariable, Mutex};
use crate::ThreadConfig;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

fn lock_unlock<B: ThreadBackend>() {
    let mut mutex = Mutex::<B>::with_backend();
    mutex.init().unwrap();
    for _ in 0..3 {
        mutex.lock().unwrap().unlock().unwrap();
    }
    mutex.destroy().unwrap();
}

fn spawn_join<B: ThreadBackend>() {
    let ran = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&ran);
    let thread = Thread::<_, B>::create_on(Some("smoke"), &ThreadConfig::default(), move || {
        seen.fetch_add(1, Ordering::Relaxed);
        B::NAME
    })
    .unwrap();
    assert_eq!(thread.join().unwrap(), Some(B::NAME));
    assert_eq!(ran.load(Ordering::Relaxed), 1);
}

fn handshake<B: ThreadBackend>() {
    let mut mutex = Mutex::<B>::with_backend();
    mutex.init().unwrap();
    let mut cond = ConditionVariable::<B>::with_backend();
    cond.init().unwrap();
    let shared = Arc::new((mutex, cond, AtomicBool::new(false)));

    let producer = {
        let shared = Arc::clone(&shared);
        Thread::<_, B>::create_on(None, &ThreadConfig::default(), move || {
            let (mutex, cond, ready) = &*shared;
            let guard = mutex.lock().unwrap();
            ready.store(true, Ordering::Relaxed);
            guard.unlock().unwrap();
            cond.signal().unwrap();
        })
        .unwrap()
    };

    let (mutex, cond, ready) = &*shared;
    let guard = cond
        .wait_while(mutex.lock().unwrap(), || !ready.load(Ordering::Relaxed))
        .unwrap();
    guard.unlock().unwrap();
    assert_eq!(producer.join().unwrap(), Some(()));
}

macro_rules! smoke_backend {
    ($name:ident, $backend:ty) => {
        mod $name {
            use super::*;

            #[test]
            fn test_lock_unlock() {
                lock_unlock::<$backend>();
            }

            #[test]
            fn test_spawn_join() {
                spawn_join::<$backend>();
            }

            #[test]
            fn test_handshake() {
                handshake::<$backend>();
            }
        }
    };
}

smoke_backend!(parking_backend, ParkingBackend);

#[cfg(target_os = "linux")]
smoke_backend!(futex_backend, FutexBackend);

#[cfg(unix)]
smoke_backend!(pthread_backend, PthreadBackend);

#[test]
fn test_default_backend_is_wakeup_safe() {
    assert!(DefaultBackend::WAKEUP_SAFE);
    assert!(ParkingBackend::WAKEUP_SAFE);
}
