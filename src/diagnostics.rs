// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects conditions that should be shown to the operator but never abort the run.

/// Collects non-fatal warnings during a deployment run.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Secure boot is enabled; the unsigned module may be refused at load.
    pub fn secure_boot(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SecureBoot,
            message: message.into(),
        }
    }

    /// No non-loopback network interface is visible yet.
    pub fn no_interfaces(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::NoInterfaces,
            message: message.into(),
        }
    }

    /// Initramfs refresh failed or no refresh tool exists.
    pub fn initramfs(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Initramfs,
            message: message.into(),
        }
    }

    /// A teardown action (rollback or cleanup) failed while draining.
    pub fn teardown(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Teardown,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Secure boot enabled; module load may still succeed.
    SecureBoot,
    /// Interface enumeration found nothing (hardware may arrive later).
    NoInterfaces,
    /// Boot-time initramfs could not be refreshed.
    Initramfs,
    /// A rollback or cleanup action failed; the drain continued regardless.
    Teardown,
}
