use pretty_assertions::assert_eq;

use x86_ops::Codec;

#[test]
fn assembles_the_bundled_worked_examples() {
    let codec = Codec::new();
    assert_eq!(codec.assemble_hex("nop").as_deref(), Some("90"));
    assert_eq!(
        codec.assemble_hex("mov eax, 0x11223344").as_deref(),
        Some("b844332211")
    );
}

#[test]
fn disassembles_a_byte_memory_move_with_displacement() {
    let codec = Codec::new();
    let hex = codec.assemble_hex("mov byte [eax+0x48], 0x69").unwrap();
    let text = codec.disassemble_hex(&hex).unwrap().unwrap();
    assert_eq!(text, "mov byte [eax+0x48], 0x69");
}

#[test]
fn assemble_smallest_prefers_the_imm8_form_when_it_fits() {
    let codec = Codec::new();
    let smallest = codec.assemble_smallest("add eax, 5").unwrap();
    assert_eq!(smallest.bytes.len(), 3); // 83 /0 ib
}

#[test]
fn assemble_lazy_accepts_the_first_matching_template() {
    let codec = Codec::new();
    assert!(codec.assemble_lazy("add eax, 5").is_some());
}

#[test]
fn every_bundled_register_round_trips_through_the_catalogue() {
    for width in [
        x86_ops::Width::Byte,
        x86_ops::Width::Word,
        x86_ops::Width::Dword,
        x86_ops::Width::Qword,
    ] {
        for reg in x86_ops::register::by_width(width) {
            assert_eq!(x86_ops::register::by_encoding(reg.enc, reg.width), Some(*reg));
        }
    }
}

#[test]
fn unmatched_assembly_returns_none_instead_of_erroring() {
    let codec = Codec::new();
    assert_eq!(codec.assemble("frobnicate eax"), None);
}

#[test]
fn hex_helpers_round_trip() {
    assert_eq!(x86_ops::to_hex(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
    assert_eq!(x86_ops::from_hex("deadbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
}
