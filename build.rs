use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::{env, fs};

static CONFIGS: &[(&str, usize)] = &[
    ("IFACE_NEIGHBOR_CACHE_COUNT", 8),
    ("IFACE_MAX_ADDR_COUNT", 4),
    ("IFACE_MAX_PREFIX_COUNT", 4),
    ("IFACE_MAX_ROUTER_COUNT", 2),
    ("IFACE_MAX_MULTICAST_GROUP_COUNT", 4),
    ("IFACE_ICMPV6_HANDLER_COUNT", 8),
    ("IFACE_ECHO_CALLBACK_COUNT", 2),
    ("IFACE_TX_QUEUE_COUNT", 8),
    ("IFACE_LINK_MTU", 1280),
    ("REASSEMBLY_BUFFER_SIZE", 1280),
    ("TCP_CONNECTION_COUNT", 8),
    ("TCP_LISTEN_PORT_COUNT", 4),
    ("TCP_MSS", 1220),
    ("TCP_RECEIVE_WINDOW", 1220),
    ("UDP_ENDPOINT_COUNT", 8),
    ("CONTEXT_COUNT", 16),
    ("CONTEXT_EVENT_QUEUE_COUNT", 16),
];

fn main() {
    // only rebuild if build.rs changed. Otherwise Cargo will rebuild if any
    // other file changed.
    println!("cargo:rerun-if-changed=build.rs");

    for (name, _) in CONFIGS {
        println!("cargo:rerun-if-env-changed=TINYIP6_{name}");
    }

    let mut configs: BTreeMap<&str, usize> = CONFIGS.iter().copied().collect();

    for (name, value) in configs.iter_mut() {
        if let Ok(raw) = env::var(format!("TINYIP6_{name}")) {
            *value = raw
                .parse()
                .unwrap_or_else(|_| panic!("TINYIP6_{name} must be an unsigned integer"));
        }
    }

    assert!(
        configs["REASSEMBLY_BUFFER_SIZE"] % 64 == 0,
        "TINYIP6_REASSEMBLY_BUFFER_SIZE must be a multiple of 64"
    );
    assert!(
        configs["TCP_MSS"] + 60 <= configs["IFACE_LINK_MTU"],
        "TINYIP6_TCP_MSS does not fit the link MTU"
    );

    let mut data = String::new();
    for (name, value) in &configs {
        writeln!(data, "pub const {name}: usize = {value};").unwrap();
    }

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    let out_file = out_dir.join("config.rs").to_string_lossy().to_string();
    fs::write(out_file, data).unwrap();
}
