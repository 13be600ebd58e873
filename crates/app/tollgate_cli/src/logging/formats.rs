use flexi_logger::DeferredNow;
use log::Record;

/// `LEVEL [module] message`, without timestamps.
pub fn cli_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> std::io::Result<()> {
    write!(
        w,
        "{} [{}] {}",
        record.level(),
        record.module_path().unwrap_or("<unnamed>"),
        record.args()
    )
}
