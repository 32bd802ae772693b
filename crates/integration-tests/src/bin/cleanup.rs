use std::process::Command;

/// Prefix of every domain name created by integration tests
const TEST_VM_PREFIX: &str = "vp-itest-";

fn cleanup_integration_test_domains() -> Result<(), Box<dyn std::error::Error>> {
    println!("Cleaning up integration test domains...");

    let list_output = Command::new("virsh")
        .args(["list", "--all", "--name"])
        .output()?;

    if !list_output.status.success() {
        eprintln!("Warning: Failed to list domains");
        return Ok(());
    }

    let names = String::from_utf8_lossy(&list_output.stdout);
    let domains: Vec<&str> = names
        .lines()
        .filter(|l| l.starts_with(TEST_VM_PREFIX))
        .collect();

    if domains.is_empty() {
        println!("No integration test domains found to clean up");
        return Ok(());
    }

    println!(
        "Found {} integration test domain(s) to clean up",
        domains.len()
    );

    let mut cleaned = 0;
    for name in domains {
        print!("  Removing domain {name}... ");
        // Fails harmlessly for domains that are not running
        let _ = Command::new("virsh").args(["destroy", name]).output()?;
        let undefine = Command::new("virsh").args(["undefine", name]).output()?;

        if undefine.status.success() {
            println!("✓");
            cleaned += 1;
        } else {
            println!("✗ (failed)");
            eprintln!("    Error: {}", String::from_utf8_lossy(&undefine.stderr));
        }
    }

    println!("Cleanup completed: {} domain(s) removed", cleaned);
    Ok(())
}

fn main() {
    if let Err(e) = cleanup_integration_test_domains() {
        eprintln!("Error during cleanup: {}", e);
        std::process::exit(1);
    }
}
