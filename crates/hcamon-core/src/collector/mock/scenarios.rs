//! Pre-built host scenarios for testing.
//!
//! Each scenario pairs a [`MockFs`] with a [`MockRunner`] whose canned tool
//! output matches the adapters in the filesystem.

use std::path::Path;

use super::filesystem::MockFs;
use super::runner::MockRunner;

pub const SYSFS_ROOT: &str = "/sys/class/infiniband";
pub const DEBUGFS_ROOT: &str = "/sys/kernel/debug/mlx5";

struct AdapterFixture<'a> {
    name: &'a str,
    slot: &'a str,
    net_dev: &'a str,
    rate: &'a str,
    qps: usize,
}

fn add_pci_attrs(fs: &mut MockFs, adapter: &AdapterFixture<'_>, physical: bool) {
    let device = Path::new(SYSFS_ROOT).join(adapter.name).join("device");
    fs.add_file(
        device.join("uevent"),
        format!(
            "DRIVER=mlx5_core\nPCI_CLASS=20000\nPCI_SLOT_NAME={}\nMODALIAS=pci:v000015B3d0000101D\n",
            adapter.slot
        ),
    );
    if physical {
        fs.add_file(device.join("sriov_numvfs"), "0\n");
    }
    fs.add_dir(device.join("net").join(adapter.net_dev));
    fs.add_file(
        Path::new(SYSFS_ROOT).join(adapter.name).join("ports/1/rate"),
        adapter.rate,
    );
    let qps = Path::new(DEBUGFS_ROOT).join(adapter.slot).join("QPs");
    fs.add_dir(&qps);
    for qpn in 0..adapter.qps {
        fs.add_dir(qps.join(format!("0x{:x}", 0x100 + qpn)));
    }
}

impl MockFs {
    /// Two active RoCE adapters plus adapters discovery must skip.
    ///
    /// Includes: `mlx5_0` and `mlx5_1` (active, physical, Ethernet),
    /// `mlx5_2` (port down), `mlx5_5` and `mezz_0` (excluded by name).
    pub fn roce_host() -> Self {
        let mut fs = Self::new();
        let root = Path::new(SYSFS_ROOT);

        fs.add_adapter(
            root,
            "mlx5_0",
            "4: ACTIVE\n",
            "Ethernet\n",
            &[("port_rcv_data", 1_000_000), ("port_xmit_data", 2_000_000)],
            &[
                ("out_of_sequence", 3),
                ("np_cnp_sent", 10),
                ("rp_cnp_handled", 5),
            ],
        );
        add_pci_attrs(
            &mut fs,
            &AdapterFixture {
                name: "mlx5_0",
                slot: "0000:1a:00.0",
                net_dev: "eth0",
                rate: "200 Gb/sec (4X HDR)\n",
                qps: 3,
            },
            true,
        );

        fs.add_adapter(
            root,
            "mlx5_1",
            "4: ACTIVE\n",
            "Ethernet\n",
            &[("port_rcv_data", 500), ("port_xmit_data", 700)],
            &[
                ("out_of_sequence", 0),
                ("np_cnp_sent", 1),
                ("rp_cnp_handled", 0),
            ],
        );
        add_pci_attrs(
            &mut fs,
            &AdapterFixture {
                name: "mlx5_1",
                slot: "0000:1b:00.0",
                net_dev: "eth1",
                rate: "400 Gb/sec (4X NDR)\n",
                qps: 1,
            },
            true,
        );

        fs.add_adapter(root, "mlx5_2", "1: DOWN\n", "Ethernet\n", &[], &[]);
        fs.add_adapter(root, "mlx5_5", "4: ACTIVE\n", "Ethernet\n", &[], &[]);
        fs.add_adapter(root, "mezz_0", "4: ACTIVE\n", "Ethernet\n", &[], &[]);

        fs
    }

    /// One active InfiniBand physical function and one virtual function.
    pub fn infiniband_host() -> Self {
        let mut fs = Self::new();
        let root = Path::new(SYSFS_ROOT);

        fs.add_adapter(
            root,
            "mlx5_0",
            "4: ACTIVE\n",
            "InfiniBand\n",
            &[("port_rcv_data", 250_000_000), ("port_xmit_data", 125_000_000)],
            &[("out_of_sequence", 42)],
        );
        add_pci_attrs(
            &mut fs,
            &AdapterFixture {
                name: "mlx5_0",
                slot: "0000:3b:00.0",
                net_dev: "ib0",
                rate: "400 Gb/sec (4X NDR)\n",
                qps: 2,
            },
            true,
        );

        fs.add_adapter(
            root,
            "mlx5_1",
            "4: ACTIVE\n",
            "InfiniBand\n",
            &[("port_rcv_data", 10), ("port_xmit_data", 20)],
            &[("out_of_sequence", 0)],
        );
        add_pci_attrs(
            &mut fs,
            &AdapterFixture {
                name: "mlx5_1",
                slot: "0000:3b:00.1",
                net_dev: "ib1",
                rate: "200 Gb/sec (4X HDR)\n",
                qps: 0,
            },
            false,
        );

        fs
    }
}

pub const ETHTOOL_ETH0: &str = "\
NIC statistics:
     rx_packets: 123456
     rx_prio0_bytes: 1000000000
     tx_prio0_bytes: 2000000000
     rx_prio0_discards: 4
     rx_prio5_bytes: 300
     tx_prio5_bytes: 400
     rx_prio5_discards: 0
     rx_prio5_pause: 17
     tx_prio5_pause: 9
     rx_prio5_pause_duration: 88
     ch0_arm: 12
";

pub const MLXLINK_MODULE: &str = "\
Operational Info
----------------
State                           : Active
Physical state                  : LinkUp
Speed                           : 200G

Module Info
-----------
Identifier                      : QSFP56
Cable Type                      : Optical Module (separated)
Temperature [C]                 : 45.2 [-5..75]
Voltage [mV]                    : 3295.5 [3135..3465]
Bias Current [mA]               : 6.750,6.750,6.500,6.750 [2..15]
Rx Power Current [dBm]          : 0.122,0.323,-0.137,N/A [-10.41..2.4]
Tx Power Current [dBm]          : 0.621,0.694,0.550,0.690 [-8.4..2.4]
";

impl MockRunner {
    /// Tool output matching [`MockFs::roce_host`].
    ///
    /// `eth1` statistics and `mlx5_1` optical diagnostics fail, which
    /// exercises the device-scoped drop path.
    pub fn roce_host() -> Self {
        let mut runner = Self::new();
        runner
            .ok(
                "rdma resource show mlx5_0",
                "0: mlx5_0: pd 4 cq 12 qp 3 cm_id 0 mr 7 ctx 2 srq 0\n",
            )
            .ok(
                "rdma resource show mlx5_1",
                "1: mlx5_1: pd 1 cq 2 qp 1 cm_id 0 mr 2 ctx 1 srq 0\n",
            )
            .ok("ethtool -S eth0", ETHTOOL_ETH0)
            .on(
                "ethtool -S eth1",
                super::MockResponse::Fail(94, "Cannot get stats information\n".into()),
            )
            .ok(
                "nsenter -t 1 -m -u -n -i -p -- mlxlink -d mlx5_0 -m",
                MLXLINK_MODULE,
            )
            .on(
                "nsenter -t 1 -m -u -n -i -p -- mlxlink -d mlx5_1 -m",
                super::MockResponse::Timeout,
            )
            .ok("setpci -s 0000:1a:00.0 68.w", "2930\n")
            .ok("setpci -s 0000:1a:00.0 68.w=5930", "")
            .ok("setpci -s 0000:1a:00.0 68.w", "5930\n")
            .ok("setpci -s 0000:1b:00.0 68.w", "5930\n")
            .ok("setpci -s 0000:1b:00.0 68.w=5930", "");
        runner
    }

    /// Tool output matching [`MockFs::infiniband_host`].
    pub fn infiniband_host() -> Self {
        let mut runner = Self::new();
        runner
            .ok(
                "rdma resource show mlx5_0",
                "0: mlx5_0: pd 2 cq 4 qp 2 cm_id 0 mr 9 ctx 1 srq 0\n",
            )
            .ok(
                "ethtool -S ib0",
                "NIC statistics:\n     rx_vport_rdma_unicast_bytes: 4096\n     tx_vport_rdma_unicast_bytes: 8192\n     rx_packets: 1\n",
            );
        runner
    }
}
