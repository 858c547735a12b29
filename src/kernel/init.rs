//! Kernel initialization phases

use crate::kernel::status::{log_statuses, register_component, update_component_status, InitStatus};
use crate::kernel::KernelError;

type Phase = (&'static str, fn() -> Result<(), KernelError>);

const PHASES: [Phase; 2] = [
    ("Interrupt System", init_interrupts),
    ("Timer", init_timer),
];

/// Bring up interrupts and the timer, then enable interrupts.
///
/// The heap is expected to be initialized already. Stops at the first
/// failing phase, leaving interrupts disabled.
pub fn init_kernel() -> Result<(), KernelError> {
    for (name, _) in PHASES {
        register_component(name);
    }
    log::info!("kernel initialization");

    for (index, (name, init_fn)) in PHASES.into_iter().enumerate() {
        log::info!("[{}/{}] initializing {}", index + 1, PHASES.len(), name);
        if let Err(e) = init_phase(name, init_fn) {
            log_statuses();
            return Err(e);
        }
    }

    x86_64::instructions::interrupts::enable();
    log_statuses();
    log::info!("kernel initialization complete, interrupts enabled");
    Ok(())
}

fn init_phase(
    name: &'static str,
    init_fn: fn() -> Result<(), KernelError>,
) -> Result<(), KernelError> {
    update_component_status(name, InitStatus::InProgress);

    match init_fn() {
        Ok(()) => {
            update_component_status(name, InitStatus::Completed);
            log::info!("    {} ready", name);
            Ok(())
        }
        Err(e) => {
            update_component_status(name, InitStatus::Failed(e.summary()));
            log::error!("    {} failed: {}", name, e);
            Err(e)
        }
    }
}

fn init_interrupts() -> Result<(), KernelError> {
    crate::arch::init();
    Ok(())
}

fn init_timer() -> Result<(), KernelError> {
    crate::timer::init()?;
    Ok(())
}
