use ringqueue::{MpmcQueue, SpscQueue};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const MESSAGES: usize = 1_000_000;
const BUFFER_SIZE: usize = 1024;

fn main() {
    println!("ringqueue Performance Test");
    println!("==========================\n");

    report("SPSC, 1 Producer, 1 Consumer", time(test_spsc));
    report("SPSC batched, 1 Producer, 1 Consumer", time(test_spsc_batched));
    for (producers, consumers) in [(1, 1), (4, 1), (1, 4), (4, 4)] {
        let label = format!("MPMC, {producers} Producers, {consumers} Consumers");
        report(&label, time(|| test_mpmc(producers, consumers)));
    }
}

fn time(f: impl FnOnce()) -> Duration {
    let start = Instant::now();
    f();
    start.elapsed()
}

fn report(label: &str, elapsed: Duration) {
    let throughput = MESSAGES as f64 / elapsed.as_secs_f64();
    println!("{} ({} messages):", label, MESSAGES);
    println!("  Time: {:?}", elapsed);
    println!("  Throughput: {:.2} msgs/sec", throughput);
    println!("  Latency: {:.0} ns/op\n", elapsed.as_nanos() as f64 / MESSAGES as f64);
}

fn test_spsc() {
    let (mut tx, mut rx) = SpscQueue::<usize, BUFFER_SIZE>::new().split();

    let producer = thread::spawn(move || {
        for i in 0..MESSAGES {
            while tx.push(i).is_err() {
                std::hint::spin_loop();
            }
        }
    });

    let consumer = thread::spawn(move || {
        for _ in 0..MESSAGES {
            while rx.pop().is_err() {
                std::hint::spin_loop();
            }
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

fn test_spsc_batched() {
    const BATCH: usize = 128;
    let (mut tx, mut rx) = SpscQueue::<usize, BUFFER_SIZE>::new().split();

    let producer = thread::spawn(move || {
        let chunk: Vec<usize> = (0..BATCH).collect();
        let mut sent = 0;
        while sent < MESSAGES {
            let n = tx.push_slice(&chunk[..BATCH.min(MESSAGES - sent)]);
            if n == 0 {
                std::hint::spin_loop();
            }
            sent += n;
        }
    });

    let consumer = thread::spawn(move || {
        let mut buf = [0usize; BATCH];
        let mut received = 0;
        while received < MESSAGES {
            let n = rx.pop_slice(&mut buf);
            if n == 0 {
                std::hint::spin_loop();
            }
            received += n;
        }
    });

    producer.join().unwrap();
    consumer.join().unwrap();
}

fn test_mpmc(producers: usize, consumers: usize) {
    let per_producer = MESSAGES / producers;
    let per_consumer = MESSAGES / consumers;

    let queue = Arc::new(MpmcQueue::<usize, BUFFER_SIZE>::new());
    let mut handles = vec![];

    for p in 0..producers {
        let q = queue.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                while q.push(p * per_producer + i).is_err() {
                    std::hint::spin_loop();
                }
            }
        }));
    }

    for _ in 0..consumers {
        let q = queue.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..per_consumer {
                while q.pop().is_err() {
                    std::hint::spin_loop();
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}
