use anyhow::Result;

fn main() -> Result<()> {
    codegraph::cli::run()
}
