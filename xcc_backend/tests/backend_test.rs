//! End-to-end emission tests: source text down to ELF bytes.

use xcc_backend::{elf_image_bytes, emit_program, write_elf_file, Image, Target, PROG_START};
use xcc_ir::lower_program;
use xcc_lexer::Lexer;
use xcc_parser::{GlobalTable, ParseContext, Parser, Program};
use xcc_sema::analyze_program;

fn compile(source: &str, target: Target) -> Image {
    let tokens = Lexer::new(source, 0).tokenize().expect("lex");
    let mut ctx = ParseContext::new();
    let decls = Parser::new(tokens, &mut ctx).parse_program().expect("parse");
    let mut program = Program { decls, structs: ctx.structs, globals: GlobalTable::new() };
    analyze_program(&mut program).expect("sema");
    let module = lower_program(&program).expect("lower");
    emit_program(&program, &module, target).expect("emit")
}

#[test]
fn elf_header_fields() {
    let image = compile("int main() { return 42; }", Target::Linux);
    let bytes = elf_image_bytes(&image, Target::Linux);

    assert_eq!(&bytes[0..8], &[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    assert_eq!(u16::from_le_bytes([bytes[16], bytes[17]]), 2, "ET_EXEC");
    assert_eq!(u16::from_le_bytes([bytes[18], bytes[19]]), 62, "EM_X86_64");

    let entry = u64::from_le_bytes(bytes[24..32].try_into().unwrap());
    let load = Target::Linux.load_address();
    assert!(entry >= load);
    assert!(entry < load + image.memsz as u64, "entry inside the loadable segment");

    // Program header: PT_LOAD, R+X, filesz <= memsz.
    let ph = &bytes[64..64 + 56];
    assert_eq!(u32::from_le_bytes(ph[0..4].try_into().unwrap()), 1, "PT_LOAD");
    assert_eq!(u32::from_le_bytes(ph[4..8].try_into().unwrap()), 5, "PF_R|PF_X");
    let filesz = u64::from_le_bytes(ph[32..40].try_into().unwrap());
    let memsz = u64::from_le_bytes(ph[40..48].try_into().unwrap());
    assert!(filesz <= memsz);
    assert_eq!(filesz as usize, image.filesz);

    // Code starts at the padded load offset.
    assert_eq!(bytes.len(), PROG_START + image.filesz);
}

#[test]
fn scenarios_compile_to_images() {
    let scenarios = [
        "int main() { return 42; }",
        "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }\n\
         int main() { return fib(10); }",
        "int main() { int a[3] = {1, 2, 3}; int s = 0; for (int i = 0; i < 3; i++) s += a[i]; \
         return s; }",
        "char s[] = \"hi\"; int main() { return s[0] + s[1]; }",
        "struct P { int x, y; }; int main() { struct P p = { .y = 7 }; return p.x + p.y; }",
        "int main() { int x = 2; switch (x) { case 1: return 10; case 2: case 3: return 20; \
         default: return 99; } }",
    ];
    for source in scenarios {
        let image = compile(source, Target::Linux);
        assert!(image.filesz > 0, "empty image for {:?}", source);
        assert!(image.filesz <= image.memsz);
    }
}

#[test]
fn global_string_bytes_land_in_the_image() {
    let image = compile("char s[] = \"hi\"; int main() { return s[0]; }", Target::Linux);
    let window = b"hi\0";
    assert!(
        image.bytes.windows(window.len()).any(|w| w == window),
        "string data missing from the image"
    );
}

#[test]
fn uninitialised_globals_go_to_bss() {
    let with = compile("int g[256]; int main() { return g[0]; }", Target::Linux);
    let without = compile("int main() { return 0; }", Target::Linux);
    assert!(with.memsz - with.filesz >= 1024, "bss tail holds the array");
    assert_eq!(without.memsz, without.filesz);
}

#[test]
fn xv6_target_uses_its_own_layout() {
    let image = compile("int main() { return 0; }", Target::Xv6);
    let bytes = elf_image_bytes(&image, Target::Xv6);
    let ph = &bytes[64..64 + 56];
    let vaddr = u64::from_le_bytes(ph[16..24].try_into().unwrap());
    assert_eq!(vaddr, 0x1000);
    // The trap-gate syscall sequence `int 0x40` appears in the shim.
    assert!(image.bytes.windows(2).any(|w| w == [0xcd, 0x40]));
}

#[test]
fn output_file_is_executable() {
    let image = compile("int main() { return 0; }", Target::Linux);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.out");
    write_elf_file(&path, &image, Target::Linux).unwrap();

    let written = std::fs::read(&path).unwrap();
    assert_eq!(&written[0..4], b"\x7fELF");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "chmod +x applied");
    }
}

#[test]
fn xv6_output_is_not_marked_executable() {
    // An XV6 image is not a host executable; only the Linux target chmods.
    let image = compile("int main() { return 0; }", Target::Xv6);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kernelimage");
    write_elf_file(&path, &image, Target::Xv6).unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0, "no exec bits on the xv6 image");
    }
}

#[test]
fn startup_shim_defines_runtime_symbols() {
    // _start, _exit and _write are callable; user code may call the stubs.
    let image = compile(
        "int main() { _write(1, \"ok\\n\", 3L); return 0; }",
        Target::Linux,
    );
    // `syscall` appears at least twice (exit and write stubs).
    let syscalls = image.bytes.windows(2).filter(|w| *w == [0x0f, 0x05]).count();
    assert!(syscalls >= 2);
}
