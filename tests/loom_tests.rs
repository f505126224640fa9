#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use ringqueue::{InlineQueue, MpmcQueue, SpscQueue};

#[test]
fn loom_spsc_fifo() {
    loom::model(|| {
        let (mut tx, mut rx) = SpscQueue::<u32, 2>::new().split();

        let producer = thread::spawn(move || {
            for i in 0..3 {
                while tx.push(i).is_err() {
                    thread::yield_now();
                }
            }
        });

        let mut received = vec![];
        while received.len() < 3 {
            match rx.pop() {
                Ok(v) => received.push(v),
                Err(_) => thread::yield_now(),
            }
        }

        producer.join().unwrap();
        assert_eq!(received, vec![0, 1, 2]);
    });
}

#[test]
fn loom_spsc_batches() {
    loom::model(|| {
        let (mut tx, mut rx) = SpscQueue::<u8, 4>::new().split();

        let producer = thread::spawn(move || {
            let input = [1, 2, 3, 4, 5];
            let mut sent = 0;
            while sent < input.len() {
                let n = tx.push_slice(&input[sent..]);
                if n == 0 {
                    thread::yield_now();
                }
                sent += n;
            }
        });

        let mut received = vec![];
        let mut buf = [0u8; 3];
        while received.len() < 5 {
            let n = rx.pop_slice(&mut buf);
            if n == 0 {
                thread::yield_now();
            }
            received.extend_from_slice(&buf[..n]);
        }

        producer.join().unwrap();
        assert_eq!(received, vec![1, 2, 3, 4, 5]);
    });
}

#[test]
fn loom_mpmc_two_producers() {
    loom::model(|| {
        let queue = Arc::new(MpmcQueue::<u32, 4>::new());

        let handles = (0..2)
            .map(|i| {
                let q = queue.clone();
                thread::spawn(move || {
                    while q.push(i).is_err() {
                        thread::yield_now();
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut received = vec![];
        while received.len() < 2 {
            match queue.pop() {
                Ok(v) => received.push(v),
                Err(_) => thread::yield_now(),
            }
        }
        for h in handles {
            h.join().unwrap();
        }

        received.sort_unstable();
        assert_eq!(received, vec![0, 1]);
        assert!(queue.is_empty());
    });
}

#[test]
fn loom_mpmc_two_consumers() {
    loom::model(|| {
        let queue = Arc::new(InlineQueue::<Box<u32>, 4>::new());
        queue.push(Box::new(7)).unwrap();
        queue.push(Box::new(8)).unwrap();

        let handles = (0..2)
            .map(|_| {
                let q = queue.clone();
                thread::spawn(move || loop {
                    match q.pop() {
                        Ok(v) => return *v,
                        Err(_) => thread::yield_now(),
                    }
                })
            })
            .collect::<Vec<_>>();

        let mut received = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .collect::<Vec<_>>();
        received.sort_unstable();
        assert_eq!(received, vec![7, 8]);
    });
}

#[test]
fn loom_mpmc_drop_with_pending() {
    loom::model(|| {
        let queue = Arc::new(MpmcQueue::<String, 4>::new());
        let q = queue.clone();
        let producer = thread::spawn(move || {
            let _ = q.push("pending".to_string());
        });
        let _ = queue.pop();
        producer.join().unwrap();
    });
}
