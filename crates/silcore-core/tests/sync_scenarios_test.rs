use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use silcore_core::sync::{
    MutexKind, condvar_create_on, condvar_destroy, condvar_signal, condvar_wait, mutex_create_on,
    mutex_destroy, mutex_lock, mutex_unlock, semaphore_create, semaphore_destroy,
    semaphore_signal, semaphore_wait,
};
use silcore_core::{PlatformVariant, Timeout};

const VARIANTS: [PlatformVariant; 2] = [PlatformVariant::Native, PlatformVariant::SemaphoreOnly];

fn broadcast_wakes_every_waiter(variant: PlatformVariant) {
    const WAITERS: usize = 10;
    let cv = condvar_create_on(variant).unwrap();
    let mx = mutex_create_on(variant, MutexKind::Plain).unwrap();
    let go = Arc::new(AtomicBool::new(false));
    let waiting = Arc::new(AtomicUsize::new(0));
    let woken = Arc::new(AtomicUsize::new(0));

    let threads: Vec<_> = (0..WAITERS)
        .map(|_| {
            let (go, waiting, woken) = (Arc::clone(&go), Arc::clone(&waiting), Arc::clone(&woken));
            thread::spawn(move || {
                assert!(mutex_lock(mx, Timeout::Forever));
                waiting.fetch_add(1, Ordering::SeqCst);
                while !go.load(Ordering::SeqCst) {
                    condvar_wait(cv, mx, Timeout::Forever);
                }
                woken.fetch_add(1, Ordering::SeqCst);
                assert!(mutex_unlock(mx));
            })
        })
        .collect();

    // Once every thread has registered, holding the mutex means each of
    // them is inside `condvar_wait`.
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        assert!(mutex_lock(mx, Timeout::Forever));
        if waiting.load(Ordering::SeqCst) == WAITERS {
            break;
        }
        assert!(mutex_unlock(mx));
        assert!(Instant::now() < deadline, "waiters never parked");
        thread::sleep(Duration::from_millis(1));
    }
    go.store(true, Ordering::SeqCst);
    assert!(condvar_signal(cv, true));
    assert!(mutex_unlock(mx));

    for t in threads {
        t.join().unwrap();
    }
    assert_eq!(woken.load(Ordering::SeqCst), WAITERS);
    #[cfg(feature = "include-tests")]
    assert_eq!(silcore_core::sync::condvar_pending_wakeups(cv), 0);

    // No stray wakeup is left behind: a fresh wait times out.
    assert!(mutex_lock(mx, Timeout::Forever));
    assert!(!condvar_wait(cv, mx, Timeout::Millis(20)));
    assert!(mutex_unlock(mx));

    // SAFETY: no waiters, unlocked, last use.
    unsafe {
        condvar_destroy(cv);
        mutex_destroy(mx);
    }
}

#[test]
fn condvar_broadcast_native() {
    broadcast_wakes_every_waiter(PlatformVariant::Native);
}

#[test]
fn condvar_broadcast_semaphore_only() {
    broadcast_wakes_every_waiter(PlatformVariant::SemaphoreOnly);
}

#[test]
fn condvar_signal_wakes_one_at_a_time() {
    for variant in VARIANTS {
        let cv = condvar_create_on(variant).unwrap();
        let mx = mutex_create_on(variant, MutexKind::Plain).unwrap();
        let tokens = Arc::new(AtomicUsize::new(0));
        let parked = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..3)
            .map(|_| {
                let (tokens, parked) = (Arc::clone(&tokens), Arc::clone(&parked));
                thread::spawn(move || {
                    assert!(mutex_lock(mx, Timeout::Forever));
                    parked.fetch_add(1, Ordering::SeqCst);
                    while tokens.load(Ordering::SeqCst) == 0 {
                        condvar_wait(cv, mx, Timeout::Forever);
                    }
                    tokens.fetch_sub(1, Ordering::SeqCst);
                    assert!(mutex_unlock(mx));
                })
            })
            .collect();
        while parked.load(Ordering::SeqCst) < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        for _ in 0..3 {
            assert!(mutex_lock(mx, Timeout::Forever));
            tokens.fetch_add(1, Ordering::SeqCst);
            assert!(condvar_signal(cv, false));
            assert!(mutex_unlock(mx));
        }
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(tokens.load(Ordering::SeqCst), 0);
        // SAFETY: no waiters, unlocked, last use.
        unsafe {
            condvar_destroy(cv);
            mutex_destroy(mx);
        }
    }
}

#[test]
fn condvar_timeouts() {
    for variant in VARIANTS {
        let cv = condvar_create_on(variant).unwrap();
        let mx = mutex_create_on(variant, MutexKind::Plain).unwrap();
        assert!(mutex_lock(mx, Timeout::Forever));
        let start = Instant::now();
        assert!(!condvar_wait(cv, mx, Timeout::Poll));
        assert!(start.elapsed() < Duration::from_millis(50));
        let start = Instant::now();
        assert!(!condvar_wait(cv, mx, Timeout::Millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(25), "{variant:?}");
        assert!(mutex_unlock(mx));
        // SAFETY: no waiters, unlocked, last use.
        unsafe {
            condvar_destroy(cv);
            mutex_destroy(mx);
        }
    }
}

fn recursive_mutex_blocks_until_final_unlock(variant: PlatformVariant) {
    let mx = mutex_create_on(variant, MutexKind::Recursive).unwrap();
    for _ in 0..3 {
        assert!(mutex_lock(mx, Timeout::Forever));
    }
    assert!(mutex_unlock(mx));
    assert!(mutex_unlock(mx));

    let acquired = Arc::new(AtomicBool::new(false));
    let contender = {
        let acquired = Arc::clone(&acquired);
        thread::spawn(move || {
            assert!(mutex_lock(mx, Timeout::Forever));
            acquired.store(true, Ordering::SeqCst);
            assert!(mutex_unlock(mx));
        })
    };
    thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst), "{variant:?}: lock taken before final unlock");
    assert!(mutex_unlock(mx));
    contender.join().unwrap();
    assert!(acquired.load(Ordering::SeqCst));
    // SAFETY: unlocked, last use.
    unsafe { mutex_destroy(mx) };
}

#[test]
fn recursive_mutex_native() {
    recursive_mutex_blocks_until_final_unlock(PlatformVariant::Native);
}

#[test]
fn recursive_mutex_semaphore_only() {
    recursive_mutex_blocks_until_final_unlock(PlatformVariant::SemaphoreOnly);
}

#[test]
fn timed_lock_policies_expire() {
    for variant in PlatformVariant::all() {
        let mx = mutex_create_on(variant, MutexKind::Plain).unwrap();
        assert!(mutex_lock(mx, Timeout::Forever));
        let timed_out = thread::spawn(move || {
            let start = Instant::now();
            (!mutex_lock(mx, Timeout::Millis(20)), start.elapsed())
        })
        .join()
        .unwrap();
        assert!(timed_out.0, "{variant:?}");
        assert!(timed_out.1 >= Duration::from_millis(15));
        assert!(mutex_unlock(mx));
        // SAFETY: unlocked, last use.
        unsafe { mutex_destroy(mx) };
    }
}

#[test]
fn semaphore_producer_consumer() {
    let items = semaphore_create(0, 64).unwrap();
    let consumer = thread::spawn(move || {
        (0..100)
            .filter(|_| semaphore_wait(items, Timeout::Millis(5000)))
            .count()
    });
    for _ in 0..100 {
        while !semaphore_signal(items) {
            thread::yield_now();
        }
    }
    assert_eq!(consumer.join().unwrap(), 100);
    // SAFETY: no waiters, last use.
    unsafe { semaphore_destroy(items) };
}
