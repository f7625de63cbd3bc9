// CLI command handlers
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use gcemu_core::cpu::disasm::{disassemble, disassemble_word};
use gcemu_core::cpu::registers::spr;
use gcemu_core::cpu::{Instruction, Interpreter, RegisterFile, RunState};
use gcemu_core::loader::{DiscImage, DolImage};
use gcemu_core::runtime::{Ram, TraceRecorder};

use crate::config::EmulatorConfig;

/// Processor version register value of the Gekko.
const GEKKO_PVR: u32 = 0x0008_3214;
/// Instructions executed between spinner updates.
const RUN_CHUNK: u64 = 1 << 20;

pub struct RunOptions<'a> {
    pub trace: bool,
    pub trace_json: Option<&'a Path>,
}

fn is_dol(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("dol"))
}

/// Read a program from a `.dol` file, or the boot DOL of a disc image.
pub fn load_program(image: &Path) -> Result<DolImage> {
    if is_dol(image) {
        DolImage::from_file(image).with_context(|| format!("Failed to load DOL file: {}", image.display()))
    } else {
        let disc = DiscImage::open(image)
            .with_context(|| format!("Failed to open disc image: {}", image.display()))?;
        disc.boot_dol().context("Failed to read boot DOL from disc")
    }
}

pub fn run(image: &Path, config: &EmulatorConfig, options: RunOptions<'_>) -> Result<()> {
    let dol = load_program(image)?;
    if let Err(err) = dol.validate() {
        log::warn!("{err}");
    }

    let mut ram = Ram::with_layout(config.ram_base, config.ram_size, config.mirror_uncached);
    let entry = dol.load_into(&mut ram).context("Failed to load program into RAM")?;
    println!("Loaded {} bytes, entry point 0x{entry:08X}", dol.payload_size());

    let mut registers = RegisterFile::new();
    registers.pc = entry;
    registers.set_gpr(1, config.initial_stack_pointer());
    registers.set_spr(spr::PVR, GEKKO_PVR);
    let mut interpreter = Interpreter::with_registers(ram, registers);

    let recorder = (config.trace_limit > 0).then(|| Rc::new(RefCell::new(TraceRecorder::new(config.trace_limit))));
    if options.trace || recorder.is_some() {
        let sink = recorder.clone();
        let log_steps = options.trace;
        interpreter.set_observer(move |pc: u32, instr: &Instruction, regs: &RegisterFile| {
            if log_steps {
                log::trace!("{pc:08X}: {}", disassemble(instr, pc));
            }
            if let Some(sink) = &sink {
                sink.borrow_mut().record(pc, instr, regs);
            }
        });
    }

    let pb = create_progress_bar("Running...");
    let mut total = 0u64;
    let state = loop {
        let budget = match config.max_steps {
            Some(max) => RUN_CHUNK.min(max - total),
            None => RUN_CHUNK,
        };
        let summary = interpreter.run(Some(budget));
        total += summary.steps;
        pb.set_message(format!("{total} instructions, pc 0x{:08X}", interpreter.registers().pc));
        pb.tick();
        if summary.state.is_halted() || config.max_steps.is_some_and(|max| total >= max) {
            break summary.state;
        }
    };
    pb.finish_with_message(format!("Executed {total} instructions"));

    match state {
        RunState::Halted(reason) => println!("Halted: {reason}"),
        RunState::Running => println!("Step budget exhausted"),
    }
    print_registers(interpreter.registers());

    if let (Some(recorder), Some(path)) = (recorder, options.trace_json) {
        let json = recorder.borrow().export_json().context("Failed to serialize trace")?;
        fs::write(path, json).with_context(|| format!("Failed to write trace: {}", path.display()))?;
        println!("Trace written to {}", path.display());
    }
    Ok(())
}

pub fn disasm(image: &Path, start: Option<u32>, count: usize) -> Result<()> {
    let dol = load_program(image)?;
    let start = start.unwrap_or(dol.entry_point) & !3;
    let section = dol
        .sections()
        .find(|s| s.contains(start))
        .with_context(|| format!("0x{start:08X} is not inside any section"))?;

    let offset = (start - section.address) as usize;
    for (i, word) in section.data[offset..].chunks_exact(4).take(count).enumerate() {
        let address = start.wrapping_add((i * 4) as u32);
        let raw = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        println!("{address:08X}:  {raw:08X}  {}", disassemble_word(raw, address));
    }
    Ok(())
}

pub fn info(image: &Path) -> Result<()> {
    let dol = if is_dol(image) {
        DolImage::from_file(image).with_context(|| format!("Failed to load DOL file: {}", image.display()))?
    } else {
        let disc = DiscImage::open(image)
            .with_context(|| format!("Failed to open disc image: {}", image.display()))?;
        println!("Game ID: {}", disc.game_id());
        println!("Title:   {}", disc.title());
        println!("Size:    {} bytes", disc.size());
        let files = disc.files().context("Failed to read file system table")?;
        println!("Files:   {}", files.len());
        for file in &files {
            println!("  {:<48} 0x{:08X} {:>10}", file.path, file.offset, file.size);
        }
        disc.boot_dol().context("Failed to read boot DOL from disc")?
    };

    println!("DOL:");
    println!("  Text sections: {}", dol.text_sections.len());
    println!("  Data sections: {}", dol.data_sections.len());
    for section in dol.sections() {
        println!(
            "    {:<4} {:>2}  0x{:08X}  0x{:06X} bytes",
            section.kind.to_string(),
            section.index,
            section.address,
            section.data.len()
        );
    }
    println!("  BSS: 0x{:08X}, size 0x{:08X}", dol.bss_address, dol.bss_size);
    println!("  Entry point: 0x{:08X}", dol.entry_point);
    if let Err(err) = dol.validate() {
        println!("  Warning: {err}");
    }
    Ok(())
}

pub fn extract(disc: &Path, file: &str, output: &Path) -> Result<()> {
    let disc = DiscImage::open(disc).with_context(|| format!("Failed to open disc image: {}", disc.display()))?;
    let bytes = disc.extract(file).with_context(|| format!("Failed to extract {file}"))?;
    fs::write(output, &bytes).with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Extracted {file} ({} bytes) to {}", bytes.len(), output.display());
    Ok(())
}

fn print_registers(regs: &RegisterFile) {
    println!("pc  {:08X}  lr  {:08X}  ctr {:08X}", regs.pc, regs.lr, regs.ctr);
    println!("cr  {:08X}  xer {:08X}  msr {:08X}", regs.cr, regs.xer, regs.msr);
    for row in 0..8u8 {
        let line: Vec<String> = (0..4u8)
            .map(|col| {
                let reg = row * 4 + col;
                format!("r{reg:<2} {:08X}", regs.gpr(reg))
            })
            .collect();
        println!("{}", line.join("  "));
    }
}

pub fn create_progress_bar(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.set_message(message.to_string());
    pb
}
