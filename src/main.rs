use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use corewrap::archive;
use corewrap::bundle;
use corewrap::error::Error;
use corewrap::transfer::{self, DumpId, DumplingClient, DEFAULT_SERVICE_URL};
use corewrap::triage;

#[derive(Parser)]
#[command(
    name = "corewrap",
    about = "Package core dumps with their loaded modules and exchange them with a dumpling service"
)]
struct Cli {
    /// Base URL of the dumpling service
    #[arg(long, global = true, default_value = DEFAULT_SERVICE_URL)]
    service: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Package a core dump and its loaded modules into a zip archive
    Wrap {
        /// Path to the core dump file
        #[arg(short = 'c', long)]
        corefile: PathBuf,
        /// Path of the zip archive to create
        #[arg(short = 'z', long)]
        zipfile: PathBuf,
        /// Additional files or directories to include
        #[arg(long, num_args = 0..)]
        addpaths: Vec<PathBuf>,
    },
    /// Restore an archive's files to their original paths under a directory
    Unwrap {
        /// Path to the core dump zip archive
        #[arg(short = 'z', long)]
        zipfile: PathBuf,
        /// Directory to unpack into (default: ./<archive stem>)
        #[arg(short = 'd', long)]
        unpackdir: Option<PathBuf>,
    },
    /// Upload an archive, wrapping a core file first if one is given
    Upload {
        /// Core dump to wrap before uploading
        #[arg(short = 'c', long)]
        corefile: Option<PathBuf>,
        /// Archive to upload (default: ./<user>.<timestamp>.zip)
        #[arg(short = 'z', long)]
        zipfile: Option<PathBuf>,
        /// Username to record with the upload (default: $USER)
        #[arg(long)]
        user: Option<String>,
        /// Distro of the machine the dump was collected on
        #[arg(long, value_enum)]
        distro: Option<Distro>,
        /// Name shown in reports for the uploaded dump
        #[arg(long)]
        displayname: Option<String>,
        /// Do not attach client triage information to the upload
        #[arg(long)]
        suppresstriage: bool,
        /// Additional files or directories to include when wrapping
        #[arg(long, num_args = 0..)]
        addpaths: Vec<PathBuf>,
    },
    /// Download an archive by dump id or URL and unpack it
    Download {
        /// Id of the dump to download
        #[arg(short = 'i', long)]
        dumpid: Option<u64>,
        /// Direct URL of the dump to download
        #[arg(short = 'u', long)]
        url: Option<String>,
        /// Where to store the downloaded archive before unpacking
        #[arg(short = 'z', long)]
        zipfile: Option<PathBuf>,
        /// Directory to unpack into
        #[arg(short = 'd', long)]
        unpackdir: Option<PathBuf>,
    },
    /// Replace the triage information attached to an uploaded dump
    Update {
        /// Id of the dump to update
        #[arg(short = 'i', long)]
        dumpid: u64,
        /// JSON file of triage key/value pairs
        #[arg(long)]
        triagefile: PathBuf,
    },
    /// Check connectivity to the dumpling service
    Hello {
        /// Name to greet the service with (default: $USER)
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Distro {
    Redhat,
    Centos,
    Ubuntu,
    Windows,
}

impl Distro {
    fn as_str(self) -> &'static str {
        match self {
            Distro::Redhat => "redhat",
            Distro::Centos => "centos",
            Distro::Ubuntu => "ubuntu",
            Distro::Windows => "windows",
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let client = DumplingClient::new(&cli.service);

    match cli.command {
        Command::Wrap {
            corefile,
            zipfile,
            addpaths,
        } => cmd_wrap(&corefile, &zipfile, &addpaths),
        Command::Unwrap { zipfile, unpackdir } => cmd_unwrap(&zipfile, unpackdir),
        Command::Upload {
            corefile,
            zipfile,
            user,
            distro,
            displayname,
            suppresstriage,
            addpaths,
        } => cmd_upload(
            &client,
            corefile,
            zipfile,
            user,
            distro,
            displayname,
            suppresstriage,
            &addpaths,
        ),
        Command::Download {
            dumpid,
            url,
            zipfile,
            unpackdir,
        } => cmd_download(&client, dumpid, url, zipfile, unpackdir),
        Command::Update { dumpid, triagefile } => cmd_update(&client, dumpid, &triagefile),
        Command::Hello { user } => cmd_hello(&client, user),
    }
}

fn cmd_wrap(corefile: &Path, zipfile: &Path, addpaths: &[PathBuf]) -> anyhow::Result<()> {
    let paths = bundle::collect(corefile, addpaths)?;
    archive::build(&paths, zipfile)?;
    println!(
        "{} core dump related files written to {}",
        "corewrap".bold().cyan(),
        zipfile.display()
    );
    Ok(())
}

fn cmd_unwrap(zipfile: &Path, unpackdir: Option<PathBuf>) -> anyhow::Result<()> {
    let unpackdir = match unpackdir {
        Some(dir) => dir,
        None => std::env::current_dir()?.join(archive_stem(zipfile)),
    };
    println!(
        "{} unpacking core dump archive to {}",
        "corewrap".bold().cyan(),
        unpackdir.display()
    );
    archive::extract(zipfile, &unpackdir)?;
    println!("all files extracted");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_upload(
    client: &DumplingClient,
    corefile: Option<PathBuf>,
    zipfile: Option<PathBuf>,
    user: Option<String>,
    distro: Option<Distro>,
    displayname: Option<String>,
    suppresstriage: bool,
    addpaths: &[PathBuf],
) -> anyhow::Result<()> {
    let user = match user {
        Some(u) => u.to_lowercase(),
        None => current_user()?,
    };
    let distro = match distro {
        Some(d) => d.as_str().to_string(),
        None => triage::host_distro_id().ok_or_else(|| {
            Error::InvalidArguments("could not detect the host distro; pass --distro".into())
        })?,
    };
    let zipfile = match zipfile {
        Some(z) => z,
        None => std::env::current_dir()?.join(format!("{}.{}.zip", user, unix_time())),
    };

    if let Some(corefile) = corefile {
        let paths = bundle::collect(&corefile, addpaths)?;
        archive::build(&paths, &zipfile)?;
    }

    let displayname = displayname.unwrap_or_else(|| archive_stem(&zipfile));
    println!(
        "{} uploading {} as '{}'",
        "corewrap".bold().cyan(),
        zipfile.display(),
        displayname
    );
    let id = client.upload(&zipfile, &user, &distro, &displayname)?;
    println!("upload succeeded, dump id: {}", id.to_string().bold());

    if !suppresstriage {
        client.update_triage(id, &triage::collect())?;
        println!("client triage information attached to dump {}", id);
    }
    Ok(())
}

fn cmd_download(
    client: &DumplingClient,
    dumpid: Option<u64>,
    url: Option<String>,
    zipfile: Option<PathBuf>,
    unpackdir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let url = match (dumpid, url) {
        (Some(id), None) => client.download_url(DumpId(id)),
        (None, Some(url)) => url,
        _ => {
            return Err(Error::InvalidArguments(
                "exactly one of --dumpid or --url is required".into(),
            )
            .into())
        }
    };

    let unpackdir = match unpackdir {
        Some(dir) => dir,
        None => std::env::current_dir()?.join(format!("corewrap.{}", unix_time())),
    };
    let zipfile = match zipfile {
        Some(z) => z,
        None => PathBuf::from(format!("{}.zip", unpackdir.display())),
    };

    // A leftover archive at this path would pass the guard below and
    // extract stale data; only a file written by this download counts.
    if zipfile.exists() {
        std::fs::remove_file(&zipfile)?;
    }
    transfer::download(&url, &zipfile);
    if !zipfile.exists() {
        anyhow::bail!("download of {} failed; no archive to unpack", url);
    }

    archive::extract(&zipfile, &unpackdir)?;
    std::fs::remove_file(&zipfile)?;
    println!(
        "{} dump unpacked to {}",
        "corewrap".bold().cyan(),
        unpackdir.display()
    );
    Ok(())
}

fn cmd_update(client: &DumplingClient, dumpid: u64, triagefile: &Path) -> anyhow::Result<()> {
    let metadata = triage::load(triagefile)?;
    client.update_triage(DumpId(dumpid), &metadata)?;
    println!("triage information for dump {} replaced", dumpid);
    Ok(())
}

fn cmd_hello(client: &DumplingClient, user: Option<String>) -> anyhow::Result<()> {
    let user = match user {
        Some(u) => u,
        None => current_user()?,
    };
    println!("{}", client.hello(&user)?);
    Ok(())
}

/// The archive file name without its `.zip` extension, used for default
/// display names and unpack directories.
fn archive_stem(zipfile: &Path) -> String {
    zipfile
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dump".to_string())
}

fn current_user() -> anyhow::Result<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map(|u| u.to_lowercase())
        .map_err(|_| {
            Error::InvalidArguments("could not determine the current user; pass --user".into())
                .into()
        })
}

/// Seconds since the epoch with fractional precision, for unique default
/// file names.
fn unix_time() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{:.7}", now.as_secs_f64())
}
