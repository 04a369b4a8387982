use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Returns the address this host uses for outbound traffic, which is what
/// devices on the hotspot should dial. Connecting a UDP socket sends nothing;
/// it only makes the OS pick a route and source address.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified()).then_some(ip)
}

/// [`local_ip`] as text, falling back to loopback when the host is offline.
pub fn local_ip_string() -> String {
    local_ip()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .to_string()
}
