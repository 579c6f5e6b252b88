mod block_file;
mod cli;

use std::fs::{self, OpenOptions};
use std::io;
use std::sync::Arc;

use block_dev::BlockDevice;
use clap::Parser;
use eefs::{EeFs, FileReader, FileType, Geometry, RlcReader, Writer, GENERAL_FILE};
use typed_bytesize::ByteSizeIec;

pub use self::{
    block_file::BlockFile,
    cli::{Cli, Command},
};

fn main() -> io::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let medium_len = ByteSizeIec::kib(cli.medium).0 as usize;
    let Geometry {
        max_files,
        max_models,
        ..
    } = Geometry::REFERENCE;
    let geo = Geometry::for_medium(cli.block_size, medium_len, max_files, max_models);
    if !geo.is_valid() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("unusable geometry: {geo:?}"),
        ));
    }

    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(matches!(cli.command, Command::Format))
        .truncate(false)
        .open(&cli.image)?;
    if matches!(cli.command, Command::Format) {
        fd.set_len(medium_len as u64)?;
    } else if (fd.metadata()?.len() as usize) < geo.medium_len() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("{:?} is smaller than the medium", cli.image),
        ));
    }
    let block_dev: Arc<dyn BlockDevice> = Arc::new(BlockFile::new(fd, medium_len));

    match cli.command {
        Command::Format => {
            let fs = EeFs::format(block_dev, geo);
            println!(
                "{} blocks of {} bytes, {} free",
                geo.usable_blocks(),
                geo.block_size,
                ByteSizeIec(fs.free_bytes() as u64)
            );
        }
        Command::Check => {
            let mut fs = EeFs::load(block_dev, geo);
            let damage = fs.inspect();
            if !damage.is_empty() {
                println!("damage: {damage:?}");
            }
            match fs.check() {
                Ok(free) => println!("ok, {free} free blocks"),
                Err(err) => println!("{err}, medium reformatted"),
            }
        }
        Command::Ls => {
            let fs = mount(block_dev, geo);
            for id in (0..geo.max_files).filter(|&id| fs.exists(id)) {
                let typ = match fs.file_type(id) {
                    Some(FileType::General) => "general",
                    Some(FileType::Model) => "model",
                    _ => "?",
                };
                println!("{id:>3} {typ:<8} {:>5}", fs.size(id));
            }
            println!("free: {}", ByteSizeIec(fs.free_bytes() as u64));
        }
        Command::Put { id, file, raw } => {
            let mut fs = mount(block_dev, geo);
            let data = fs::read(&file)?;
            let typ = if id == GENERAL_FILE {
                FileType::General
            } else {
                FileType::Model
            };

            let mut writer = Writer::new();
            if raw {
                writer
                    .create(&mut fs, id, typ, true)
                    .and_then(|()| writer.write(&mut fs, &data))
                    .and_then(|()| writer.close(&mut fs))
                    .map_err(to_io)?;
            } else {
                writer
                    .write_rlc(&mut fs, id, typ, &data, true)
                    .map_err(to_io)?;
            }
            log::info!("file {id}: {} bytes stored in {}", data.len(), fs.size(id));
        }
        Command::Get { id, file, raw } => {
            let mut fs = mount(block_dev, geo);
            let mut data = Vec::new();
            let mut buf = [0; 64];

            if raw {
                let mut reader = FileReader::open(&mut fs, id).map_err(to_io)?;
                read_to_end(&mut data, &mut buf, |buf| reader.read(&fs, buf));
            } else {
                let mut reader = RlcReader::open(&mut fs, id).map_err(to_io)?;
                read_to_end(&mut data, &mut buf, |buf| reader.read(&fs, buf));
                if reader.is_broken() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("file {id}: invalid run-length control byte"),
                    ));
                }
            }
            fs::write(&file, &data)?;
        }
        Command::Rm { id } => mount(block_dev, geo).rm(id).map_err(to_io)?,
        Command::Swap { a, b } => mount(block_dev, geo).swap(a, b).map_err(to_io)?,
        Command::Copy { dst, src } => {
            let mut fs = mount(block_dev, geo);
            Writer::new().copy(&mut fs, dst, src).map_err(to_io)?;
        }
    }

    Ok(())
}

/// 挂载镜像，重新格式化时提示全部文件已丢失
fn mount(block_dev: Arc<dyn BlockDevice>, geo: Geometry) -> EeFs {
    let fs = EeFs::open(block_dev, geo);
    if let Some(err) = fs.mount_errno() {
        eprintln!("{err}: image reformatted, all files lost");
    }
    fs
}

fn read_to_end(data: &mut Vec<u8>, buf: &mut [u8], mut read: impl FnMut(&mut [u8]) -> usize) {
    loop {
        let n = read(buf);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }
}

fn to_io(err: eefs::Error) -> io::Error {
    let kind = match err {
        eefs::Error::NotFound => io::ErrorKind::NotFound,
        eefs::Error::Full => io::ErrorKind::StorageFull,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, err.to_string())
}
