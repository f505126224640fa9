//! Streams samples through an SPSC ring in slice batches.
//!
//! The producer offers chunks larger than the free space and keeps whatever
//! tail did not fit; the consumer drains into a fixed buffer. Batches that
//! cross the end of the ring are split internally, so both sides only see
//! partial counts.

use ringqueue::SpscQueue;
use std::thread;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SAMPLES: u32 = 200;
const CHUNK: usize = 24;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (mut tx, mut rx) = SpscQueue::<u32, 32>::new().split();

    let producer = thread::spawn(move || {
        let samples = (0..SAMPLES).collect::<Vec<_>>();
        let mut pending = &samples[..];
        let mut short_writes = 0;
        while !pending.is_empty() {
            let want = pending.len().min(CHUNK);
            let n = tx.push_slice(&pending[..want]);
            if n < want {
                short_writes += 1;
                thread::yield_now();
            }
            pending = &pending[n..];
        }
        info!(short_writes, "producer done");
    });

    let consumer = thread::spawn(move || {
        let mut buf = [0u32; 20];
        let mut next = 0;
        let mut sum = 0u64;
        while next < SAMPLES {
            let n = rx.pop_slice(&mut buf);
            if n == 0 {
                thread::yield_now();
                continue;
            }
            for &sample in &buf[..n] {
                assert_eq!(sample, next, "samples arrive in order");
                sum += u64::from(sample);
                next += 1;
            }
            println!("batch of {n:>2}, {next:>3}/{SAMPLES} received");
        }
        sum
    });

    producer.join().unwrap();
    let sum = consumer.join().unwrap();
    println!("sum of {SAMPLES} samples: {sum}");
}
