fn main() -> anyhow::Result<()> {
    exviewer_lib::run()
}
