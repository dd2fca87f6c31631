mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn zero_timeout_fires_before_run_returns() {
    let reactor = common::reactor();
    let fired = Rc::new(Cell::new(false));

    let flag = fired.clone();
    reactor.set_timeout(Duration::ZERO, move || flag.set(true));

    reactor.run().expect("Reactor failed");

    assert!(fired.get(), "Zero timeout should fire before run returns");
    assert!(reactor.is_idle(), "Reactor should be idle afterwards");
}

#[test]
fn timeout_waits_at_least_its_delay() {
    let reactor = common::reactor();
    let elapsed = Rc::new(Cell::new(None));

    let start = Instant::now();
    let slot = elapsed.clone();
    reactor.set_timeout(Duration::from_millis(50), move || slot.set(Some(start.elapsed())));

    reactor.run().expect("Reactor failed");

    let elapsed = elapsed.get().expect("Timer never fired");
    assert!(elapsed >= Duration::from_millis(50));
}

#[test]
fn timers_fire_by_deadline_then_registration_order() {
    let reactor = common::reactor();
    let order = Rc::new(RefCell::new(Vec::new()));

    for (name, delay) in [("late", 30), ("first", 10), ("second", 10), ("third", 10)] {
        let order = order.clone();
        reactor.set_timeout(Duration::from_millis(delay), move || {
            order.borrow_mut().push(name)
        });
    }

    reactor.run().expect("Reactor failed");

    assert_eq!(*order.borrow(), vec!["first", "second", "third", "late"]);
}

#[test]
fn cleared_timeout_never_fires() {
    let reactor = common::reactor();
    let fired = Rc::new(Cell::new(false));

    let flag = fired.clone();
    let id = reactor.set_timeout(Duration::from_millis(10), move || flag.set(true));

    assert!(reactor.clear_timer(id));
    assert!(!reactor.clear_timer(id), "A stale id is a no-op");

    reactor.run().expect("Reactor failed");

    assert!(!fired.get());
}

#[test]
fn timer_cleared_by_one_due_in_the_same_pass_never_fires() {
    let reactor = common::reactor();
    let order = Rc::new(RefCell::new(Vec::new()));
    let victim_slot = Rc::new(Cell::new(None));

    let (log, slot, handle) = (order.clone(), victim_slot.clone(), reactor.clone());
    reactor.set_timeout(Duration::ZERO, move || {
        log.borrow_mut().push("first");
        let victim = slot.get().expect("id not recorded");
        assert!(handle.clear_timer(victim), "The second timer is still live");
    });

    let log = order.clone();
    let victim = reactor.set_timeout(Duration::ZERO, move || log.borrow_mut().push("second"));
    victim_slot.set(Some(victim));

    reactor.run().expect("Reactor failed");

    assert_eq!(*order.borrow(), vec!["first"]);
    assert!(reactor.is_idle());
}

#[test]
fn interval_cancelled_from_its_third_firing_stops() {
    let reactor = common::reactor();
    let count = Rc::new(Cell::new(0));
    let id_slot = Rc::new(Cell::new(None));

    let counter = count.clone();
    let slot = id_slot.clone();
    let handle = reactor.clone();
    let id = reactor.set_interval(Duration::from_millis(5), move || {
        counter.set(counter.get() + 1);
        if counter.get() == 3 {
            handle.clear_timer(slot.get().expect("id not recorded"));
        }
    });
    id_slot.set(Some(id));

    // Keeps the loop alive past the point where a 4th firing would occur.
    reactor.set_timeout(Duration::from_millis(60), || {});

    reactor.run().expect("Reactor failed");

    assert_eq!(count.get(), 3);
}

#[test]
fn zero_period_interval_still_advances() {
    let reactor = common::reactor();
    let count = Rc::new(Cell::new(0u32));

    let counter = count.clone();
    let id = reactor.set_interval(Duration::ZERO, move || counter.set(counter.get() + 1));

    let handle = reactor.clone();
    reactor.set_timeout(Duration::from_millis(30), move || {
        handle.clear_timer(id);
    });

    reactor.run().expect("Reactor failed");

    assert!(count.get() >= 1);
    assert!(count.get() <= 31, "Zero periods are clamped to 1ms");
}

#[test]
fn stop_returns_with_timers_still_registered() {
    let reactor = common::reactor();

    reactor.set_timeout(Duration::from_secs(10), || {});

    let handle = reactor.clone();
    reactor.set_timeout(Duration::from_millis(10), move || handle.stop());

    let start = Instant::now();
    reactor.run().expect("Reactor failed");

    assert!(start.elapsed() < Duration::from_secs(5));
    assert!(!reactor.is_idle(), "The long timer should still be registered");
}

#[test]
fn stop_handle_interrupts_a_blocked_poll() {
    let reactor = common::reactor();
    reactor.set_timeout(Duration::from_secs(10), || {});

    let handle = reactor.stop_handle();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.stop();
    });

    let start = Instant::now();
    reactor.run().expect("Reactor failed");

    assert!(start.elapsed() < Duration::from_secs(5));
    stopper.join().expect("Thread panicked");
}

#[test]
fn blocking_work_completes_on_the_loop_thread() {
    let reactor = common::reactor();
    let loop_thread = thread::current().id();
    let seen = Rc::new(RefCell::new(None));

    let slot = seen.clone();
    reactor.spawn_blocking(
        || (thread::current().id(), 21 * 2),
        move |(worker, value)| {
            *slot.borrow_mut() = Some((worker, value, thread::current().id()));
        },
    );

    reactor.run().expect("Reactor failed");

    let (worker, value, delivered_on) = seen.borrow_mut().take().expect("Job never completed");
    assert_eq!(value, 42);
    assert_ne!(worker, loop_thread);
    assert_eq!(delivered_on, loop_thread);
}

#[test]
fn deferred_callbacks_run_in_order() {
    let reactor = common::reactor();
    let order = Rc::new(RefCell::new(Vec::new()));

    for i in 0..3 {
        let order = order.clone();
        reactor.defer(move || order.borrow_mut().push(i));
    }

    reactor.run().expect("Reactor failed");

    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}
