fn main() -> anyhow::Result<()> {
    shpd_relay_lib::run()
}
