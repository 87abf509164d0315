//! Loaded-module discovery from ELF core files.
//!
//! A core dump records the files that were mapped into the crashed process
//! in its `NT_FILE` note. Parsing that note recovers the full set of binary
//! images a debugger would need on another machine, without launching a
//! debugger here. Discovery is best-effort: every failure is reported as
//! [`Error::Introspection`] so callers can fall back to packaging the core
//! file alone.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use object::elf::{self, FileHeader64};
use object::read::elf::{FileHeader, ProgramHeader};
use object::Endianness;

use crate::error::{Error, Result};

/// Runtime library whose presence triggers companion expansion.
pub const RUNTIME_MODULE: &str = "libcoreclr.so";
/// Diagnostics-support companion expected next to the runtime library.
pub const DAC_COMPANION: &str = "libmscordaccore.so";
/// Managed-runtime support companion expected next to the runtime library.
pub const SOS_COMPANION: &str = "libsos.so";

/// A discovered binary image and its by-convention companion files.
///
/// Companions come from a filename rule, not from introspection; whether
/// they actually exist is checked at packaging time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleImage {
    pub path: PathBuf,
    pub companions: Vec<PathBuf>,
}

pub type ModuleList = Vec<ModuleImage>;

/// Enumerate the binary images mapped into a crashed process.
///
/// Opens `core_path` read-only, parses it as a little-endian x86-64 ELF
/// core image and decodes its `NT_FILE` note. A valid core that carries no
/// file note yields an empty list; anything else that goes wrong is an
/// [`Error::Introspection`].
pub fn discover(core_path: &Path) -> Result<ModuleList> {
    let file = File::open(core_path)
        .map_err(|e| Error::Introspection(format!("open core '{}': {}", core_path.display(), e)))?;
    let mmap = unsafe { Mmap::map(&file) }
        .map_err(|e| Error::Introspection(format!("mmap core: {}", e)))?;

    let paths = mapped_files(&mmap)?;
    Ok(paths
        .into_iter()
        .map(|path| ModuleImage {
            companions: companions_for(&path),
            path,
        })
        .collect())
}

/// Companion files implied by an image's file name.
pub fn companions_for(image: &Path) -> Vec<PathBuf> {
    match (image.file_name(), image.parent()) {
        (Some(name), Some(dir)) if name == RUNTIME_MODULE => {
            vec![dir.join(DAC_COMPANION), dir.join(SOS_COMPANION)]
        }
        _ => Vec::new(),
    }
}

/// Extract the distinct mapped file paths from a core image, in
/// first-seen order.
fn mapped_files(data: &[u8]) -> Result<Vec<PathBuf>> {
    let header = FileHeader64::<Endianness>::parse(data)
        .map_err(|e| Error::Introspection(format!("parse ELF header: {}", e)))?;
    let endian = header
        .endian()
        .map_err(|e| Error::Introspection(format!("ELF byte order: {}", e)))?;

    if endian != Endianness::Little || header.e_machine.get(endian) != elf::EM_X86_64 {
        return Err(Error::Introspection(
            "unsupported core architecture (expected little-endian x86-64)".into(),
        ));
    }
    if header.e_type.get(endian) != elf::ET_CORE {
        return Err(Error::Introspection("not an ELF core file".into()));
    }

    let phdrs = header
        .program_headers(endian, data)
        .map_err(|e| Error::Introspection(format!("program headers: {}", e)))?;

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for ph in phdrs {
        if ph.p_type(endian) != elf::PT_NOTE {
            continue;
        }
        let Some(mut notes) = ph
            .notes(endian, data)
            .map_err(|e| Error::Introspection(format!("note segment: {}", e)))?
        else {
            continue;
        };
        while let Some(note) = notes
            .next()
            .map_err(|e| Error::Introspection(format!("note entry: {}", e)))?
        {
            if note.name() != b"CORE" || note.n_type(endian) != elf::NT_FILE {
                continue;
            }
            for path in parse_file_note(note.desc())
                .ok_or_else(|| Error::Introspection("malformed NT_FILE note".into()))?
            {
                if seen.insert(path.clone()) {
                    out.push(path);
                }
            }
        }
    }
    Ok(out)
}

/// Decode an NT_FILE descriptor into its path list.
///
/// Layout: count (u64), page size (u64), count x {start, end, page offset}
/// (u64 each), then count NUL-terminated path strings.
fn parse_file_note(desc: &[u8]) -> Option<Vec<PathBuf>> {
    let count = read_u64_le(desc, 0)? as usize;
    let table_end = 16usize.checked_add(count.checked_mul(24)?)?;
    let mut strings = desc.get(table_end..)?;

    let mut paths = Vec::with_capacity(count);
    for _ in 0..count {
        let nul = strings.iter().position(|&b| b == 0)?;
        let path = std::str::from_utf8(&strings[..nul]).ok()?;
        if !path.is_empty() {
            paths.push(PathBuf::from(path));
        }
        strings = &strings[nul + 1..];
    }
    Some(paths)
}

fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + 8)?;
    Some(u64::from_le_bytes(bytes.try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const EHDR_SIZE: usize = 64;
    const PHDR_SIZE: usize = 56;

    fn file_note_desc(paths: &[&str]) -> Vec<u8> {
        let mut desc = Vec::new();
        desc.extend_from_slice(&(paths.len() as u64).to_le_bytes());
        desc.extend_from_slice(&4096u64.to_le_bytes());
        for (i, _) in paths.iter().enumerate() {
            let start = 0x400000u64 + i as u64 * 0x10000;
            desc.extend_from_slice(&start.to_le_bytes());
            desc.extend_from_slice(&(start + 0x1000).to_le_bytes());
            desc.extend_from_slice(&0u64.to_le_bytes());
        }
        for path in paths {
            desc.extend_from_slice(path.as_bytes());
            desc.push(0);
        }
        desc
    }

    fn note(name: &[u8], note_type: u32, desc: &[u8]) -> Vec<u8> {
        let align4 = |n: usize| (n + 3) & !3;
        let mut out = Vec::new();
        out.extend_from_slice(&(name.len() as u32).to_le_bytes());
        out.extend_from_slice(&(desc.len() as u32).to_le_bytes());
        out.extend_from_slice(&note_type.to_le_bytes());
        out.extend_from_slice(name);
        out.resize(12 + align4(name.len()), 0);
        out.extend_from_slice(desc);
        out.resize(12 + align4(name.len()) + align4(desc.len()), 0);
        out
    }

    /// Synthesize a minimal ELF64 core image holding the given notes in a
    /// single PT_NOTE segment.
    fn fake_core(e_type: u16, notes: &[u8]) -> Vec<u8> {
        let note_off = (EHDR_SIZE + PHDR_SIZE) as u64;

        let mut ehdr = vec![0u8; EHDR_SIZE];
        ehdr[0..4].copy_from_slice(b"\x7fELF");
        ehdr[4] = 2; // ELFCLASS64
        ehdr[5] = 1; // ELFDATA2LSB
        ehdr[6] = 1; // EV_CURRENT
        ehdr[16..18].copy_from_slice(&e_type.to_le_bytes());
        ehdr[18..20].copy_from_slice(&elf::EM_X86_64.to_le_bytes());
        ehdr[20..24].copy_from_slice(&1u32.to_le_bytes());
        ehdr[32..40].copy_from_slice(&(EHDR_SIZE as u64).to_le_bytes());
        ehdr[52..54].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        ehdr[54..56].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        ehdr[56..58].copy_from_slice(&1u16.to_le_bytes());

        let mut phdr = vec![0u8; PHDR_SIZE];
        phdr[0..4].copy_from_slice(&elf::PT_NOTE.to_le_bytes());
        phdr[8..16].copy_from_slice(&note_off.to_le_bytes());
        phdr[32..40].copy_from_slice(&(notes.len() as u64).to_le_bytes());
        phdr[40..48].copy_from_slice(&(notes.len() as u64).to_le_bytes());

        let mut out = ehdr;
        out.extend_from_slice(&phdr);
        out.extend_from_slice(notes);
        out
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn discovers_mapped_files() {
        let desc = file_note_desc(&["/usr/bin/app", "/lib/x86_64/libc.so.6"]);
        let core = fake_core(elf::ET_CORE, &note(b"CORE\0", elf::NT_FILE, &desc));
        let tmp = write_temp(&core);

        let modules = discover(tmp.path()).unwrap();
        let paths: Vec<_> = modules.iter().map(|m| m.path.as_path()).collect();
        assert_eq!(
            paths,
            vec![Path::new("/usr/bin/app"), Path::new("/lib/x86_64/libc.so.6")]
        );
        assert!(modules.iter().all(|m| m.companions.is_empty()));
    }

    #[test]
    fn duplicate_mappings_reported_once() {
        // One file mapped as several segments shows up repeatedly in NT_FILE.
        let desc = file_note_desc(&["/usr/bin/app", "/usr/bin/app", "/usr/bin/app"]);
        let core = fake_core(elf::ET_CORE, &note(b"CORE\0", elf::NT_FILE, &desc));
        let tmp = write_temp(&core);

        let modules = discover(tmp.path()).unwrap();
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn runtime_module_gains_companions() {
        let desc = file_note_desc(&["/usr/share/dotnet/libcoreclr.so"]);
        let core = fake_core(elf::ET_CORE, &note(b"CORE\0", elf::NT_FILE, &desc));
        let tmp = write_temp(&core);

        let modules = discover(tmp.path()).unwrap();
        assert_eq!(
            modules[0].companions,
            vec![
                PathBuf::from("/usr/share/dotnet/libmscordaccore.so"),
                PathBuf::from("/usr/share/dotnet/libsos.so")
            ]
        );
    }

    #[test]
    fn companion_rule_is_name_based() {
        assert_eq!(
            companions_for(Path::new("/lib/libcoreclr.so")),
            vec![
                PathBuf::from("/lib/libmscordaccore.so"),
                PathBuf::from("/lib/libsos.so")
            ]
        );
        assert!(companions_for(Path::new("/lib/libc.so.6")).is_empty());
    }

    #[test]
    fn core_without_file_note_yields_no_modules() {
        let core = fake_core(elf::ET_CORE, &note(b"CORE\0", elf::NT_PRSTATUS, &[0u8; 32]));
        let tmp = write_temp(&core);
        assert!(discover(tmp.path()).unwrap().is_empty());
    }

    #[test]
    fn non_core_elf_is_rejected() {
        let core = fake_core(elf::ET_EXEC, &note(b"CORE\0", elf::NT_FILE, &file_note_desc(&[])));
        let tmp = write_temp(&core);
        assert!(matches!(
            discover(tmp.path()),
            Err(Error::Introspection(_))
        ));
    }

    #[test]
    fn garbage_input_is_introspection_error() {
        let tmp = write_temp(b"this is not an ELF core");
        assert!(matches!(
            discover(tmp.path()),
            Err(Error::Introspection(_))
        ));
    }

    #[test]
    fn missing_core_is_introspection_error() {
        assert!(matches!(
            discover(Path::new("/nonexistent/app.core")),
            Err(Error::Introspection(_))
        ));
    }

    #[test]
    fn truncated_file_note_is_malformed() {
        // Claims 8 entries but carries none.
        let mut desc = Vec::new();
        desc.extend_from_slice(&8u64.to_le_bytes());
        desc.extend_from_slice(&4096u64.to_le_bytes());
        let core = fake_core(elf::ET_CORE, &note(b"CORE\0", elf::NT_FILE, &desc));
        let tmp = write_temp(&core);
        assert!(matches!(
            discover(tmp.path()),
            Err(Error::Introspection(_))
        ));
    }

    #[test]
    fn file_note_roundtrip() {
        let desc = file_note_desc(&["/a", "/b/c"]);
        let paths = parse_file_note(&desc).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/a"), PathBuf::from("/b/c")]);
    }
}
