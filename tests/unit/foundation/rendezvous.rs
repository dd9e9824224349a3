use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn completion_waits_for_every_producer() {
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let rv = Rendezvous::new(3, move |values: Vec<u32>| {
        assert_eq!(values.len(), 3);
        f.fetch_add(1, Ordering::SeqCst);
    });

    rv.arrive(1);
    rv.arrive(2);
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(rv.remaining(), 1);
    rv.arrive(3);
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    rv.arrive(4);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn zero_producers_complete_immediately() {
    let (_rv, rx) = Rendezvous::<()>::channel(0);
    assert_eq!(rx.recv().unwrap().len(), 0);
}

#[test]
fn threads_join_through_channel() {
    let (rv, rx) = Rendezvous::channel(4);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let rv = rv.clone();
            std::thread::spawn(move || rv.arrive(i))
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let mut values = rx.recv().unwrap();
    values.sort();
    assert_eq!(values, vec![0, 1, 2, 3]);
}

#[test]
fn concurrent_arrivals_complete_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    let rv = Rendezvous::new(8, move |values: Vec<usize>| {
        assert_eq!(values.len(), 8);
        f.fetch_add(1, Ordering::SeqCst);
    });
    std::thread::scope(|s| {
        for i in 0..8 {
            let rv = rv.clone();
            s.spawn(move || rv.arrive(i));
        }
    });
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(rv.remaining(), 0);
}
