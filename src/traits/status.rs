#[cfg(test)]
use mockall::automock;

/// Receiver of installer status updates (the presentation layer).
#[cfg_attr(test, automock)]
pub trait StatusSink {
    fn set_model(&self, model: &str);

    fn set_epsilon_version(&self, version: &str);

    fn set_omega_version(&self, version: &str);

    fn set_username(&self, username: &str);

    /// `kind` is `"omega"` or `"epsilon"`.
    fn calculator_detected(&self, kind: &str);

    fn set_progress_percentage(&self, percent: f32);

    /// Report an error. `detail = None` clears the previous one.
    fn calculator_error(&self, fatal: bool, detail: Option<String>);

    fn installation_finished(&self);

    fn firmware_not_found(&self, name: &str);

    fn installer_not_compatible(&self);
}

/// Sink that forwards every update to the `log` facade.
#[derive(Default)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn set_model(&self, model: &str) {
        log::info!("Model: {}", model);
    }

    fn set_epsilon_version(&self, version: &str) {
        log::info!("Epsilon version: {}", version);
    }

    fn set_omega_version(&self, version: &str) {
        log::info!("Omega version: {}", version);
    }

    fn set_username(&self, username: &str) {
        log::info!("Username: {}", username);
    }

    fn calculator_detected(&self, kind: &str) {
        log::info!("Calculator detected ({})", kind);
    }

    fn set_progress_percentage(&self, percent: f32) {
        log::debug!("Progress: {:.0}%", percent);
    }

    fn calculator_error(&self, fatal: bool, detail: Option<String>) {
        match detail {
            Some(detail) if fatal => log::error!("{}", detail),
            Some(detail) => log::warn!("{}", detail),
            None => {}
        }
    }

    fn installation_finished(&self) {
        log::info!("Installation finished");
    }

    fn firmware_not_found(&self, name: &str) {
        log::error!("Firmware '{}' not found", name);
    }

    fn installer_not_compatible(&self) {
        log::error!("No DFU transport available on this host");
    }
}
