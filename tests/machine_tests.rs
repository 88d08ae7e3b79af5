use std::time::Duration;

use famicore::{
    clock::CPU_CYCLES_PER_FRAME, get_machine, mapper::Mirroring, Machine, MachineBuilder,
    MachineConfig,
};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    famicore::init_tracing("famicore=debug");
}

const SYNC_TIMEOUT: Duration = Duration::from_secs(20);

fn prg() -> Vec<u8> {
    (0..8u8).flat_map(|bank| vec![bank; 0x2000]).collect()
}

fn get_test_machine() -> Machine {
    MachineBuilder::new()
        .prg(&prg())
        .config(MachineConfig {
            idle_park_micros: 50,
            ..MachineConfig::default()
        })
        .build()
        .unwrap()
}

fn run_frames(machine: &mut Machine, frames: u64) {
    machine.step_for(CPU_CYCLES_PER_FRAME as u64 * frames);
    assert!(machine.sync_video(SYNC_TIMEOUT), "video thread fell behind");
}

#[test]
fn test_lifecycle() {
    let mut machine = get_test_machine();

    machine.start().unwrap();
    assert!(machine.is_running());

    run_frames(&mut machine, 2);
    assert!(machine.video.frames_committed() >= 1);

    machine.stop().unwrap();
    assert!(!machine.is_running());
    let frames = machine.video.frames_committed();

    // A stopped unit neither runs nor accumulates budget.
    machine.step_for(CPU_CYCLES_PER_FRAME as u64);
    assert_eq!(machine.video.pending_dots(), 0);
    assert_eq!(machine.video.frames_committed(), frames);

    machine.stop().unwrap();
    assert!(!machine.is_running());
}

#[test]
fn test_double_start_is_harmless() {
    let mut machine = get_test_machine();

    machine.start().unwrap();
    machine.start().unwrap();
    run_frames(&mut machine, 1);
    machine.stop().unwrap();

    assert!(!machine.is_running());
}

#[test]
fn test_frames_reach_the_consumer_whole() {
    let mut machine = get_test_machine();
    machine.start().unwrap();

    assert!(!machine.fetch_frame());

    let mut last = None;
    for _ in 0..5 {
        run_frames(&mut machine, 1);
        if machine.fetch_frame() {
            let frame = machine.frame();
            assert!(frame.is_consistent(), "torn frame {}", frame.number);
            if let Some(previous) = last {
                assert!(frame.number > previous);
            }
            last = Some(frame.number);
        }
    }

    machine.stop().unwrap();
    assert!(last.is_some());
}

#[test]
fn test_frame_carries_register_snapshot() {
    let mut machine = get_test_machine();
    machine.write_byte(0x2001, 0x1E);
    machine.start().unwrap();

    run_frames(&mut machine, 1);
    machine.stop().unwrap();

    assert!(machine.fetch_frame());
    assert_eq!(machine.frame().registers.mask, 0x1E);
}

#[test]
fn test_vblank_nmi() {
    let mut machine = get_test_machine();
    machine.write_byte(0x2000, 0x80);
    machine.start().unwrap();

    run_frames(&mut machine, 1);
    machine.stop().unwrap();

    assert!(machine.nmi.is_raised());
    assert!(machine.nmi.acknowledge());
    assert!(!machine.nmi.is_raised());
}

#[test]
fn test_scanline_irq_through_the_video_thread() {
    let mut machine = get_test_machine();
    machine.write_byte(0xC000, 20);
    machine.write_byte(0xC001, 0);
    machine.write_byte(0xE001, 0);
    machine.write_byte(0x2001, 0x08);
    machine.start().unwrap();

    run_frames(&mut machine, 1);
    machine.stop().unwrap();

    assert!(machine.irq.is_raised());
    assert!(machine.irq.raised_count() >= 10);
}

#[test]
fn test_sync_video_delivers_the_step_scanlines() {
    let mut machine = get_test_machine();
    machine.write_byte(0xC000, 1);
    machine.write_byte(0xC001, 0);
    machine.write_byte(0xE001, 0);
    machine.write_byte(0x2001, 0x08);
    machine.start().unwrap();

    run_frames(&mut machine, 1);

    assert!(machine.irq.is_raised());
    assert_eq!(machine.service_scanlines(), 0);
    machine.stop().unwrap();
}

#[test]
fn test_no_irq_while_rendering_is_off() {
    let mut machine = get_test_machine();
    machine.write_byte(0xC000, 1);
    machine.write_byte(0xC001, 0);
    machine.write_byte(0xE001, 0);
    machine.start().unwrap();

    run_frames(&mut machine, 1);
    machine.stop().unwrap();

    assert_eq!(machine.service_scanlines(), 0);
    assert!(!machine.irq.is_raised());
}

#[test]
fn test_reset_restarts_video() {
    let mut machine = get_test_machine();
    machine.write_byte(0x0000, 0x55);
    machine.start().unwrap();
    run_frames(&mut machine, 2);

    machine.reset().unwrap();

    assert!(machine.is_running());
    assert_eq!(machine.get_cycles(), 0);
    assert_eq!(machine.read_byte(0x0000), 0x00);
    assert!(!machine.fetch_frame());

    run_frames(&mut machine, 1);
    machine.stop().unwrap();
    assert!(machine.fetch_frame());
    assert_eq!(machine.frame().number, 0);
}

#[test]
fn test_mirroring_register() {
    let mut machine = get_machine(&prg(), &[]).unwrap();

    assert_eq!(machine.bus.mapper().mirroring(), Mirroring::Horizontal);
    machine.write_byte(0xA000, 0);
    assert_eq!(machine.bus.mapper().mirroring(), Mirroring::Vertical);
}

#[test]
fn test_outer_bank_lock() {
    let mut machine = get_test_machine();

    machine.write_byte(0x6000, 0x80);
    machine.write_byte(0x6000, 0x42);

    assert_eq!(machine.read_byte(0x6000), 0x42);
    assert_eq!(machine.read_byte(0xE000), 7);
}

#[test]
fn test_memory_dump() {
    let mut machine = get_test_machine();
    machine.write_byte(0x0100, b'N');
    machine.write_byte(0x0101, b'E');
    machine.write_byte(0x0102, b'S');

    let dump = machine.memory_dump(0x0100, 0x010F);
    tracing::info!("{}", dump);

    assert!(dump.starts_with("0100: 4e 45 53"));
    assert!(dump.contains("NES"));
}
