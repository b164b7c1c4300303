fn main() -> anyhow::Result<()> {
    warden::init_tracing();
    warden::run()?;
    Ok(())
}
