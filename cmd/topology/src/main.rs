//! Print the discovered topology and the pool built on it
//!
//! # Environment Variables
//!
//! - `NPL_GANGS`, `NPL_WORKERS_PER_GANG` - logical grid (default: numa x cores)
//! - `NPL_SHAPE=2x8` - cap the hardware extent
//! - `NPL_BIND=0` - do not pin threads
//! - `NPL_LOG_LEVEL=debug` - log level (off, error, warn, info, debug, trace)

use numapool::{compute_mapping, detect, HostPool, PoolConfig};
use std::io;
use std::process::ExitCode;

// NPL_LOG_LEVEL=info cargo run -p numapool-topology
fn main() -> ExitCode {
    println!("=== numapool topology ===\n");

    let topo = detect();
    let shape = topo.shape();
    println!("Provider:          {}", topo.name());
    println!("NUMA regions:      {}", shape.numa_count);
    println!("Cores per region:  {}", shape.cores_per_numa);
    println!("Threads per core:  {}", shape.threads_per_core);
    println!("Binding:           {}", if topo.can_bind() { "supported" } else { "unsupported" });
    match topo.this_thread_coordinate() {
        Ok(c) => println!("Main thread on:    {}", c),
        Err(e) => println!("Main thread on:    unknown ({})", e),
    }
    println!();

    let config = PoolConfig::from_env();
    config.print();
    println!();

    let usable = shape.clamp_request(config.hardware_cap);
    match compute_mapping(config.logical(), usable, Default::default()) {
        Ok(assignment) => {
            println!("Planned mapping ({}):", config.logical());
            for (rank, coord) in assignment.iter().enumerate() {
                println!("  rank {:>4} -> {}", rank, coord);
            }
        }
        Err(e) => println!("Planned mapping:   {}", e),
    }
    println!();

    let pool = match HostPool::start(config) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("initialize failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = pool.print_configuration(&mut io::stdout(), true) {
        eprintln!("print failed: {}", e);
        return ExitCode::FAILURE;
    }

    // each rank reports where the OS actually runs it
    let topo = pool.topology().clone();
    let result = pool.execute_serial(|ctx| {
        let now = topo
            .this_thread_coordinate()
            .map(|c| c.to_string())
            .unwrap_or_else(|_| "?".into());
        println!(
            "  rank {:>4} assigned {} running on {}",
            ctx.rank(),
            ctx.coordinate(),
            now
        );
    });
    if let Err(e) = result {
        eprintln!("dispatch failed: {}", e);
        return ExitCode::FAILURE;
    }

    println!("\n=== Done ===");
    ExitCode::SUCCESS
}
