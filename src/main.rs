fn main() -> anyhow::Result<()> {
    task_reminder_lib::run()
}
