use ringqueue::MpmcQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Work Queue Example\n");

    const NUM_WORKERS: usize = 4;
    const NUM_JOBS: usize = 20;

    let jobs = Arc::new(MpmcQueue::<String, 128>::new());
    let results = Arc::new(MpmcQueue::<String, 128>::new());
    let jobs_done = Arc::new(AtomicBool::new(false));

    let jobs_tx = jobs.clone();
    let done = jobs_done.clone();
    let producer = thread::spawn(move || {
        for i in 0..NUM_JOBS {
            let job = format!("Job-{:02}", i);
            while jobs_tx.push(job.clone()).is_err() {
                std::hint::spin_loop();
            }
            println!("Enqueued: {}", job);
            thread::sleep(Duration::from_millis(50));
        }
        done.store(true, Ordering::Release);
        println!("All jobs enqueued!");
    });

    let mut workers = vec![];
    for worker_id in 0..NUM_WORKERS {
        let jobs_rx = jobs.clone();
        let results_tx = results.clone();
        let done = jobs_done.clone();

        workers.push(thread::spawn(move || {
            let mut processed = 0;
            loop {
                match jobs_rx.pop() {
                    Ok(job) => {
                        println!("Worker {} processing: {}", worker_id, job);
                        thread::sleep(Duration::from_millis(200));

                        let mut result = format!("{} -> completed by worker {}", job, worker_id);
                        while let Err(err) = results_tx.push(result) {
                            result = err.into_inner();
                            std::hint::spin_loop();
                        }
                        processed += 1;
                    }
                    Err(_) => {
                        if done.load(Ordering::Acquire) && jobs_rx.is_empty() {
                            break;
                        }
                        thread::sleep(Duration::from_millis(10));
                    }
                }
            }
            println!("Worker {} finished ({} jobs)", worker_id, processed);
        }));
    }

    let results_rx = results.clone();
    let collector = thread::spawn(move || {
        let mut collected = 0;
        while collected < NUM_JOBS {
            match results_rx.pop() {
                Ok(result) => {
                    println!("Result: {}", result);
                    collected += 1;
                }
                Err(_) => std::hint::spin_loop(),
            }
        }
        println!("All results collected!");
    });

    producer.join().unwrap();
    for worker in workers {
        worker.join().unwrap();
    }
    collector.join().unwrap();

    println!("\nWork queue example completed!");
}
