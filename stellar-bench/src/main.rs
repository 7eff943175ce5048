fn main() -> anyhow::Result<()> {
    stellar_bench::cli::execute()
}
