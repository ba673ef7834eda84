fn main() -> anyhow::Result<()> {
    sysmgmt_lib::run()?;
    Ok(())
}
