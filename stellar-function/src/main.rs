fn main() -> anyhow::Result<()> {
    stellar_function::cli::execute()
}
