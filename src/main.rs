use stress_test::{stress_test_fanout, stress_test_scaling, stress_test_scatter};

fn main() {
    tracing_subscriber::fmt::init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };
    let converged = rt.block_on(async_main());
    if !converged {
        std::process::exit(1);
    }
}

async fn async_main() -> bool {
    let mut converged = true;

    // Run async stress tests
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                               ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Test 1: fan-out with small scale
    let stats = stress_test_fanout(4, 500, 1).await;
    stats.print();
    converged &= stats.converged();

    // Test 2: fan-out with medium scale
    let stats = stress_test_fanout(16, 5_000, 2).await;
    stats.print();
    converged &= stats.converged();

    // Test 3: scattered original-addressing batches
    let stats = stress_test_scatter(100, 10_000, 3).await;
    stats.print();
    converged &= stats.converged();

    // Test 4: Scaling analysis
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS (Fan-out)                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    stress_test_scaling(20, 5).await;

    if converged {
        println!("\n✓ All stress tests completed successfully!");
    } else {
        println!("\n✗ Some mirrors diverged from their source");
    }
    converged
}
