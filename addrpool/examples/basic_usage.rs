//! Basic usage of addrpool. Set `ADDRPOOL_LOG=trace` to watch the trie.

use addrpool::{AddrPool, AllocError, Config};
use fullness_trie::FullnessTrie;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

const ENV_NAME: &str = "ADDRPOOL_LOG";

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var(ENV_NAME)
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
    init_logging();
    example_create_destroy();
    example_pool();
    example_exhaustion();
}

fn example_create_destroy() {
    println!("=== FullnessTrie create/destroy ===\n");

    let trie: FullnessTrie<u32> = FullnessTrie::default();
    println!("{trie:?}");
    println!("Freed nodes: {}\n", trie.destroy());
}

fn example_pool() {
    println!("=== AddrPool (/24) ===\n");

    let pool = AddrPool::with_config(Config {
        width: 8,
        ..Config::default()
    })
    .unwrap();

    // Requests for a taken address move to a nearby free one.
    for _ in 0..3 {
        println!("allocate(10) = {:?}", pool.allocate(10));
    }
    println!("allocate_any() = {:?}", pool.allocate_any());
    println!("release(11) = {:?}", pool.release(11));
    println!("release(11) = {:?}", pool.release(11));
    println!("Allocated: {:?}", pool.snapshot());
    println!("Stats: {:?}\n", pool.stats());
}

fn example_exhaustion() {
    println!("=== Exhaustion (/29) ===\n");

    let pool = AddrPool::with_config(Config {
        width: 3,
        ..Config::default()
    })
    .unwrap();

    loop {
        match pool.allocate_any() {
            Ok(addr) => println!("got {addr}"),
            Err(AllocError::AlreadyFull) => {
                println!("pool exhausted after {} addresses", pool.allocated());
                break;
            }
            Err(err) => panic!("{err}"),
        }
    }
}
