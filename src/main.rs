use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use url::Url;

use pkitool::cert::params::{CertificateRequest, MAX_VALIDITY_DAYS, Subject, SubjectAltName};
use pkitool::passphrase::{PromptNewPassphraseReader, PromptPassphraseReader, read_new_key_passphrase};
use pkitool::pki::{Pki, ROOT_CA_NAME};
use pkitool::printer::{print_certificate, print_crl};

#[derive(Debug, Parser)]
#[command(name = "pki", version, about = "public key infrastructure management")]
struct Arguments {
    #[arg(short, long, value_name = "PATH", default_value = ".", help = "The path of the pki directory")]
    directory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the directory, its configuration and the root authority
    InitializePki {
        #[arg(short, long, value_name = "DAYS", default_value_t = 365, value_parser = parse_validity)]
        validity: u32,
        #[command(flatten)]
        subject: SubjectArgs,
    },
    /// Issue a new certificate and its private key
    CreateCertificate {
        #[arg(help = "The name of the certificate")]
        name: String,
        #[arg(short, long = "issuer-certificate", value_name = "NAME", default_value = ROOT_CA_NAME)]
        issuer: String,
        #[arg(long, help = "Create a ca certificate")]
        ca: bool,
        #[arg(long, help = "Create a client certificate")]
        client: bool,
        #[arg(short, long, value_name = "DAYS", value_parser = parse_validity)]
        validity: Option<u32>,
        #[command(flatten)]
        subject: SubjectArgs,
        #[command(flatten)]
        san: SanArgs,
    },
    /// Add a certificate to the crl of its issuer
    RevokeCertificate {
        #[arg(help = "The name of the certificate to revoke")]
        name: String,
        #[arg(short, long = "issuer-certificate", value_name = "NAME", default_value = ROOT_CA_NAME)]
        issuer: String,
    },
    /// Print the content of a certificate
    PrintCertificate {
        name: String,
    },
    /// Print the crl of an issuing certificate
    PrintCrl {
        name: String,
    },
}

#[derive(Debug, Args)]
struct SubjectArgs {
    #[arg(long, value_name = "NAME", help = "The subject country")]
    country: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject organization")]
    organization: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject organizational unit")]
    organizational_unit: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject locality")]
    locality: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject province")]
    province: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject street address")]
    street_address: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject postal code")]
    postal_code: Option<String>,
    #[arg(long, value_name = "NAME", help = "The subject common name")]
    common_name: Option<String>,
}

impl SubjectArgs {
    fn into_subject(self) -> Subject {
        Subject {
            country: self.country.unwrap_or_default(),
            organization: self.organization.unwrap_or_default(),
            organizational_unit: self.organizational_unit.unwrap_or_default(),
            locality: self.locality.unwrap_or_default(),
            province: self.province.unwrap_or_default(),
            street_address: self.street_address.unwrap_or_default(),
            postal_code: self.postal_code.unwrap_or_default(),
            common_name: self.common_name.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Args)]
struct SanArgs {
    #[arg(long, value_name = "URIS", value_delimiter = ',', value_parser = parse_list_item::<Url>, help = "A comma-separated list of uris")]
    san_uris: Vec<Url>,
    #[arg(long, value_name = "NAMES", value_delimiter = ',', value_parser = parse_list_item::<String>, help = "A comma-separated list of dns names")]
    san_dns_names: Vec<String>,
    #[arg(long, value_name = "ADDRESSES", value_delimiter = ',', value_parser = parse_list_item::<IpAddr>, help = "A comma-separated list of ip addresses")]
    san_ip_addresses: Vec<IpAddr>,
    #[arg(long, value_name = "ADDRESSES", value_delimiter = ',', value_parser = parse_list_item::<String>, help = "A comma-separated list of email addresses")]
    san_email_addresses: Vec<String>,
}

impl SanArgs {
    fn into_san(self) -> SubjectAltName {
        SubjectAltName {
            uris: self.san_uris,
            dns_names: self.san_dns_names,
            ip_addresses: self.san_ip_addresses,
            email_addresses: self.san_email_addresses,
        }
    }
}

fn parse_validity(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(days) if (1..=MAX_VALIDITY_DAYS).contains(&days) => Ok(days),
        _ => Err(format!("must be a number of days between 1 and {MAX_VALIDITY_DAYS}")),
    }
}

/// Parses one element of a comma-separated list. Surrounding spaces are
/// ignored and empty elements are errors.
fn parse_list_item<T>(s: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let item = s.trim_matches(' ');
    if item.is_empty() {
        return Err("empty list item".to_string());
    }
    item.parse::<T>()
        .map_err(|e| format!("invalid value {item:?}: {e}"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Arguments::parse();
    run(args)
}

fn run(args: Arguments) -> Result<()> {
    let directory = args.directory;

    let open = || Pki::open(&directory).context("cannot load pki configuration");

    match args.command {
        Command::InitializePki { validity, subject } => {
            initialize(&directory, validity, subject.into_subject())?;
        }
        Command::CreateCertificate {
            name,
            issuer,
            ca,
            client,
            validity,
            subject,
            san,
        } => {
            if ca && client {
                bail!("a certificate cannot be both a ca and a client certificate");
            }
            let request = CertificateRequest::builder()
                .validity(validity.unwrap_or(0))
                .subject(subject.into_subject())
                .san(san.into_san())
                .is_ca(ca)
                .is_client_certificate(client)
                .build();
            let pki = open()?;
            let password = read_new_key_passphrase(&PromptNewPassphraseReader, &name)
                .context("cannot read private key password")?;
            pki.issue(
                &name,
                &request,
                &issuer,
                password.as_deref(),
                &PromptPassphraseReader,
            )
            .with_context(|| format!("cannot create certificate {name:?}"))?;
        }
        Command::RevokeCertificate { name, issuer } => {
            open()?
                .revoke(&name, &issuer, &PromptPassphraseReader)
                .with_context(|| format!("cannot revoke certificate {name:?}"))?;
        }
        Command::PrintCertificate { name } => {
            let cert = open()?.load_certificate(&name)?;
            print_certificate(io::stdout().lock(), &cert)?.flush()?;
        }
        Command::PrintCrl { name } => {
            let crl = open()?.load_crl(&name)?;
            print_crl(io::stdout().lock(), &crl)?.flush()?;
        }
    }

    Ok(())
}

fn initialize(directory: &Path, validity: u32, mut subject: Subject) -> Result<()> {
    if subject.common_name.is_empty() {
        subject.common_name = ROOT_CA_NAME.to_string();
    }
    let request = CertificateRequest::builder()
        .validity(validity)
        .subject(subject)
        .is_ca(true)
        .build();
    request.validate()?;

    let password = read_new_key_passphrase(&PromptNewPassphraseReader, ROOT_CA_NAME)
        .context("cannot read private key password")?;
    let pki = Pki::initialize(directory).context("cannot initialize pki")?;
    pki.bootstrap_root(&request, password.as_deref())
        .context("cannot create root certificate authority")?;
    Ok(())
}
