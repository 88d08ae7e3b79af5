use famicore::{
    cartridge::{CartridgeImage, CHR_BANK_SIZE, PRG_BANK_SIZE},
    interrupt::InterruptLine,
    mapper::{AddressSpaces, Mapper, Mirroring},
    mapper52::Mapper52,
};

#[cfg(test)]
#[ctor::ctor]
fn init() {
    famicore::init_tracing("famicore=debug");
}

/// Every byte of a PRG bank holds a pattern unique to the bank and offset.
fn prg_byte(bank: usize, offset: usize) -> u8 {
    (bank as u8).wrapping_mul(31) ^ (offset as u8)
}

fn image(prg_banks: usize, chr_banks: usize) -> CartridgeImage {
    let prg = (0..prg_banks)
        .flat_map(|bank| (0..PRG_BANK_SIZE).map(move |offset| prg_byte(bank, offset)))
        .collect();
    let chr = (0..chr_banks)
        .flat_map(|bank| vec![bank as u8; CHR_BANK_SIZE])
        .collect();
    CartridgeImage::new(prg, chr).unwrap()
}

fn setup(prg_banks: usize, chr_banks: usize) -> (Mapper52, AddressSpaces, InterruptLine) {
    let mut spaces = AddressSpaces::new(0xFF);
    let irq = InterruptLine::new();
    let mapper = Mapper52::new(image(prg_banks, chr_banks), irq.clone(), &mut spaces, 0x2000)
        .unwrap();
    (mapper, spaces, irq)
}

#[test]
fn test_last_bank_is_fixed_at_power_on() {
    for prg_banks in [2, 4, 16, 64] {
        let (_mapper, spaces, _) = setup(prg_banks, 8);

        for offset in 0..PRG_BANK_SIZE {
            assert_eq!(
                spaces.cpu.read_byte(0xE000 + offset as u16),
                prg_byte(prg_banks - 1, offset),
                "{} banks, offset {:#06X}",
                prg_banks,
                offset
            );
        }
    }
}

#[test]
fn test_last_bank_survives_bank_switching() {
    let (mut mapper, mut spaces, _) = setup(16, 8);

    for (addr, value) in [(0x8000, 0x46), (0x8001, 3), (0x8000, 0x47), (0x8001, 9)] {
        mapper.write(addr, value, &mut spaces);
    }

    assert_eq!(spaces.cpu.read_byte(0xE123), prg_byte(15, 0x123));
    assert_eq!(spaces.cpu.read_byte(0xA000), prg_byte(9, 0));
    assert_eq!(spaces.cpu.read_byte(0xC000), prg_byte(3, 0));
    assert_eq!(spaces.cpu.read_byte(0x8000), prg_byte(14, 0));
}

#[test]
fn test_power_on_state() {
    let (mapper, spaces, irq) = setup(8, 16);

    assert_eq!(mapper.registers(), [0; 8]);
    assert_eq!(mapper.mirroring(), Mirroring::Horizontal);
    assert!(!mapper.irq_enabled());
    assert_eq!(mapper.irq_counter(), 0);
    assert_eq!(mapper.irq_period(), 0);
    assert!(!irq.is_raised());
    assert_eq!(spaces.cpu.find_overlap(), None);
    assert_eq!(spaces.ppu.find_overlap(), None);
}

#[test]
fn test_apply_is_idempotent() {
    let (mut mapper, mut spaces, _) = setup(16, 64);
    for (addr, value) in [(0x8000, 0xC2), (0x8001, 0x11), (0xA000, 0x00)] {
        mapper.write(addr, value, &mut spaces);
    }

    let cpu_once = spaces.cpu.bindings();
    let ppu_once = spaces.ppu.bindings();

    mapper.apply(&mut spaces);
    mapper.apply(&mut spaces);

    assert_eq!(spaces.cpu.bindings(), cpu_once);
    assert_eq!(spaces.ppu.bindings(), ppu_once);
}

#[test]
fn test_repeated_register_write_is_idempotent() {
    let (mut mapper, mut spaces, _) = setup(16, 64);

    mapper.write(0x8000, 0x01, &mut spaces);
    mapper.write(0x8001, 0x0C, &mut spaces);
    let cpu_once = spaces.cpu.bindings();
    let ppu_once = spaces.ppu.bindings();

    mapper.write(0x8001, 0x0C, &mut spaces);

    assert_eq!(spaces.cpu.bindings(), cpu_once);
    assert_eq!(spaces.ppu.bindings(), ppu_once);
    assert_eq!(spaces.ppu.read_byte(0x0C00), 0x0D);
}

#[test]
fn test_irq_fires_after_period_scanlines() {
    for period in [1u8, 2, 8, 100, 255] {
        let (mut mapper, mut spaces, irq) = setup(4, 8);
        mapper.write(0xC000, period, &mut spaces);
        mapper.write(0xC001, 0, &mut spaces);
        mapper.write(0xE001, 0, &mut spaces);

        for line in 1..period {
            mapper.signal_scanline();
            assert!(!irq.is_raised(), "period {} fired early at {}", period, line);
        }

        mapper.signal_scanline();
        assert!(irq.is_raised(), "period {} never fired", period);
        assert_eq!(irq.raised_count(), 1);
        assert_eq!(mapper.irq_counter(), period);
    }
}

#[test]
fn test_irq_reloads_and_fires_again() {
    let (mut mapper, mut spaces, irq) = setup(4, 8);
    mapper.write(0xC000, 4, &mut spaces);
    mapper.write(0xC001, 0, &mut spaces);
    mapper.write(0xE001, 0, &mut spaces);

    for _ in 0..12 {
        mapper.signal_scanline();
    }

    assert_eq!(irq.raised_count(), 3);
}

#[test]
fn test_disable_stops_counting_without_clearing_line() {
    let (mut mapper, mut spaces, irq) = setup(4, 8);
    mapper.write(0xC000, 2, &mut spaces);
    mapper.write(0xC001, 0, &mut spaces);
    mapper.write(0xE001, 0, &mut spaces);
    mapper.signal_scanline();
    mapper.signal_scanline();
    assert!(irq.is_raised());

    mapper.write(0xE000, 0, &mut spaces);
    for _ in 0..10 {
        mapper.signal_scanline();
    }

    assert!(irq.is_raised());
    assert_eq!(irq.raised_count(), 1);
    assert_eq!(mapper.irq_counter(), 2);
}

#[test]
fn test_out_of_range_bank_values_wrap() {
    let (mut mapper, mut spaces, _) = setup(4, 8);

    mapper.write(0x8000, 0x06, &mut spaces);
    mapper.write(0x8001, 0xFF, &mut spaces);
    mapper.write(0x8000, 0x02, &mut spaces);
    mapper.write(0x8001, 0xFF, &mut spaces);

    assert_eq!(spaces.cpu.read_byte(0x8000), prg_byte(3, 0));
    assert_eq!(spaces.ppu.read_byte(0x1000), 7);
    assert_eq!(spaces.cpu.find_overlap(), None);
}

#[test]
fn test_vertical_mirroring() {
    let (mut mapper, mut spaces, _) = setup(4, 8);

    mapper.write(0xA000, 0x00, &mut spaces);
    spaces.ppu.write_byte(0x2010, 0x5A);

    assert_eq!(mapper.mirroring(), Mirroring::Vertical);
    assert_eq!(spaces.ppu.read_byte(0x2810), 0x5A);
    assert_eq!(spaces.ppu.read_byte(0x2410), 0x00);
}
