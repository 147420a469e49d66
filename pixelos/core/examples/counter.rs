use pixelos_core::{AddressSpace, BlockStore, Event, InstructionUnit, Opcode};
use std::path::PathBuf;

fn main() -> pixelos_core::Result<()> {
    // Count to two, print, halt.
    let mut unit = InstructionUnit::new(AddressSpace::new());
    unit.load_program(
        0,
        &[
            Opcode::IncR0.color(),
            Opcode::IncR0.color(),
            Opcode::PrintR0.color(),
            Opcode::Halt.color(),
        ],
    );
    let stop = unit.run(100);
    for event in unit.drain_events() {
        if let Event::Print(value) = event {
            println!("R0 = {value}");
        }
    }
    println!("stopped: {stop:?} at pc {}", unit.pc());

    // Stash the decoded bytes of low memory on a small disk and write the
    // disk out as pixels.
    let mut disk = BlockStore::new(8, 16)?;
    let block = disk.allocate(1)?[0];
    let mut payload = vec![0u8; 16];
    for (offset, byte) in payload.iter_mut().enumerate() {
        *byte = unit.memory.read(offset as u32);
    }
    disk.write_block(block, &payload)?;
    disk.save(&PathBuf::from("counter-disk.pxi"))?;
    println!("saved counter-disk.pxi ({} blocks)", disk.blocks());
    Ok(())
}
