use nfs_burrow::server::{Server, TransportKind};

/// Exports a local directory over NFS v2. Usage:
///
///   exportfs <directory> [port] [tcp|udp]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let export = args.next().unwrap_or_else(|| ".".to_string());
    let port: u16 = args.next().as_deref().unwrap_or("11111").parse()?;
    let kind = match args.next().as_deref() {
        Some("udp") => TransportKind::Udp,
        _ => TransportKind::Tcp,
    };

    println!("Starting NFS server for {export} on 0.0.0.0:{port}");
    println!("You can mount it with: sudo mount -o proto=tcp,port={port},mountport={port},nolock,addr=127.0.0.1 127.0.0.1:/ /mnt/nfs");

    let mut server = Server::bind(&export, &format!("0.0.0.0:{port}"), kind).await?;
    server.start();
    server.join().await?;
    Ok(())
}
