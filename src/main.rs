// ABOUTME: Entry point for the SQL Utility command line tool
// ABOUTME: Calls the library run function and maps failure to a non-zero exit code

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if !sql_utility_lib::run().await? {
        std::process::exit(1);
    }
    Ok(())
}
