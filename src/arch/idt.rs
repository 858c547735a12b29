//! # Interrupt Descriptor Table and Handlers
//!
//! ## Exception Handlers
//!
//! | Exception              | Action                              |
//! |------------------------|-------------------------------------|
//! | Breakpoint (#BP)       | Log the frame, continue             |
//! | Page Fault (#PF)       | Log CR2 and error code, halt        |
//! | Divide Error (#DE)     | Log, halt                           |
//! | Invalid Opcode (#UD)   | Log, halt                           |
//! | General Protection     | Log with error code, halt           |
//! | Double Fault (#DF)     | Log, halt (uses IST stack)          |
//!
//! Exceptions are fail-stop: nothing in this kernel can recover from a CPU
//! fault, so the handler reports and parks the CPU.
//!
//! ## Hardware Interrupts
//!
//! Vectors 32-47 each get a small trampoline that forwards the IRQ line to
//! [`IRQ_HANDLERS`] and acknowledges the PIC afterwards. Lines nobody
//! registered for are acknowledged and dropped.

use spin::Lazy;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame, PageFaultErrorCode};

use crate::arch::gdt;
use crate::arch::pic::{irq_vector, PICS};
use crate::arch::registry::IrqRegistry;
use crate::{hlt_loop, println};

/// Handlers for IRQ 0-15, consulted by every hardware interrupt.
pub static IRQ_HANDLERS: IrqRegistry = IrqRegistry::new();

macro_rules! irq_trampolines {
    ($($name:ident => $irq:expr),* $(,)?) => {
        $(
            extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
                irq_entry($irq);
            }
        )*

        fn install_irq_trampolines(idt: &mut InterruptDescriptorTable) {
            $(
                idt[irq_vector($irq)].set_handler_fn($name);
            )*
        }
    };
}

irq_trampolines! {
    irq0 => 0, irq1 => 1, irq2 => 2, irq3 => 3,
    irq4 => 4, irq5 => 5, irq6 => 6, irq7 => 7,
    irq8 => 8, irq9 => 9, irq10 => 10, irq11 => 11,
    irq12 => 12, irq13 => 13, irq14 => 14, irq15 => 15,
}

fn irq_entry(irq: u8) {
    IRQ_HANDLERS.dispatch(irq);

    unsafe {
        PICS.lock().notify_end_of_interrupt(irq_vector(irq));
    }
}

static IDT: Lazy<InterruptDescriptorTable> = Lazy::new(|| {
    let mut idt = InterruptDescriptorTable::new();

    // CPU EXCEPTIONS (0-31)
    idt.breakpoint.set_handler_fn(breakpoint_handler);
    idt.page_fault.set_handler_fn(page_fault_handler);
    idt.divide_error.set_handler_fn(divide_error_handler);
    idt.invalid_opcode.set_handler_fn(invalid_opcode_handler);
    idt.general_protection_fault.set_handler_fn(general_protection_fault_handler);
    // Double fault needs its own stack to avoid cascading failures
    unsafe {
        idt.double_fault
            .set_handler_fn(double_fault_handler)
            .set_stack_index(gdt::DOUBLE_FAULT_IST_INDEX);
    }
    // HARDWARE INTERRUPTS (32-47 after remapping)
    install_irq_trampolines(&mut idt);

    idt
});

pub fn init_idt() {
    IDT.load();
}

extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: BREAKPOINT\n{:#?}", stack_frame);
}

extern "x86-interrupt" fn divide_error_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: DIVIDE BY ZERO\n{:#?}", stack_frame);
    hlt_loop();
}

extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    println!("EXCEPTION: INVALID OPCODE\n{:#?}", stack_frame);
    hlt_loop();
}

extern "x86-interrupt" fn general_protection_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: u64,
) {
    println!(
        "EXCEPTION: GENERAL PROTECTION FAULT (error code: {})\n{:#?}",
        error_code, stack_frame
    );
    hlt_loop();
}

extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) -> ! {
    println!("EXCEPTION: DOUBLE FAULT (code {})\n{:#?}", error_code, stack_frame);
    hlt_loop();
}

extern "x86-interrupt" fn page_fault_handler(
    stack_frame: InterruptStackFrame,
    error_code: PageFaultErrorCode,
) {
    use x86_64::registers::control::Cr2;

    println!("EXCEPTION: PAGE FAULT");
    match Cr2::read() {
        Ok(addr) => println!("Accessed Address: {:?}", addr),
        Err(e) => println!("Failed to read CR2: {:?}", e),
    }
    println!("Error Code: {:?}", error_code);
    println!("{:#?}", stack_frame);
    hlt_loop();
}
