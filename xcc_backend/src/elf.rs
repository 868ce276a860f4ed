//! ELF64 executable output.
//!
//! One ELF header, one `PT_LOAD` program header covering the code/data image
//! plus the zero-extended BSS tail, padding up to the load offset, then the
//! raw machine-code bytes. No section headers: the output is an executable,
//! not a relocatable object.

use crate::emit::Image;
use crate::{Target, PROG_START};
use std::io::Write;
use std::path::Path;
use xcc_common::{CompileError, CompileResult};

const ELF_HEADER_SIZE: usize = 64;
const PROGRAM_HEADER_SIZE: usize = 56;

const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_R: u32 = 4;

/// Build the complete file image: headers, padding, code.
pub fn elf_image_bytes(image: &Image, target: Target) -> Vec<u8> {
    let load_address = target.load_address();
    let entry = load_address + image.entry_offset as u64;

    let mut out = Vec::with_capacity(PROG_START + image.filesz);
    out_elf_header(&mut out, entry);
    out_program_header(
        &mut out,
        PROG_START as u64,
        load_address,
        image.filesz as u64,
        image.memsz as u64,
    );
    // Pad so the first code byte lands at the load offset.
    debug_assert!(out.len() <= PROG_START);
    out.resize(PROG_START, 0);
    out.extend_from_slice(&image.bytes[..image.filesz]);
    out
}

fn out_elf_header(out: &mut Vec<u8>, entry: u64) {
    // e_ident
    out.extend_from_slice(&[0x7f, b'E', b'L', b'F', 2, 1, 1, 0]);
    out.extend_from_slice(&[0; 8]);
    out.extend_from_slice(&ET_EXEC.to_le_bytes());
    out.extend_from_slice(&EM_X86_64.to_le_bytes());
    out.extend_from_slice(&1u32.to_le_bytes()); // e_version
    out.extend_from_slice(&entry.to_le_bytes());
    out.extend_from_slice(&(ELF_HEADER_SIZE as u64).to_le_bytes()); // e_phoff
    out.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
    out.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    out.extend_from_slice(&(ELF_HEADER_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&(PROGRAM_HEADER_SIZE as u16).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    out.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
}

fn out_program_header(out: &mut Vec<u8>, offset: u64, vaddr: u64, filesz: u64, memsz: u64) {
    debug_assert!(filesz <= memsz);
    out.extend_from_slice(&PT_LOAD.to_le_bytes());
    out.extend_from_slice(&(PF_R | PF_X).to_le_bytes());
    out.extend_from_slice(&offset.to_le_bytes());
    out.extend_from_slice(&vaddr.to_le_bytes());
    out.extend_from_slice(&vaddr.to_le_bytes()); // p_paddr
    out.extend_from_slice(&filesz.to_le_bytes());
    out.extend_from_slice(&memsz.to_le_bytes());
    out.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align
}

/// Write the executable to `path`. Linux output is marked executable; an
/// XV6 image is not a host executable, so its permissions are left alone.
pub fn write_elf_file(path: &Path, image: &Image, target: Target) -> CompileResult<()> {
    let bytes = elf_image_bytes(image, target);
    let mut file = std::fs::File::create(path)
        .map_err(|e| CompileError::io(format!("cannot create `{}`: {}", path.display(), e)))?;
    file.write_all(&bytes)
        .map_err(|e| CompileError::io(format!("cannot write `{}`: {}", path.display(), e)))?;
    drop(file);

    #[cfg(unix)]
    if target == Target::Linux {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(|e| CompileError::io(format!("chmod failed: {}", e)))?;
    }
    Ok(())
}
