use anyhow::Result;

fn main() -> Result<()> {
    wasmc_pack::cli::run::<String>(None)
}
