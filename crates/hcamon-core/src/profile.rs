//! Link-layer profiles.
//!
//! A profile says which NIC statistics are relevant for a link layer, how
//! rates are derived from its counters and which columns the dashboard shows.
//! It is selected once per device from [`LinkLayer`] instead of branching on
//! the link layer in every consumer.

use crate::model::LinkLayer;

/// How a derived metric is computed from two readings of one counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateKind {
    /// `delta * 8 * multiplier / elapsed / 1e9` Gbps.
    ///
    /// The multiplier rebuilds an aggregate from counters that only cover a
    /// single lane of a multi-lane link.
    Throughput { multiplier: f64 },
    /// Plain increase, not divided by time.
    Delta,
}

/// A counter whose rate is derived every cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateSpec {
    pub counter: &'static str,
    pub kind: RateKind,
}

/// Where a dashboard cell takes its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellSource {
    DeviceName,
    /// Raw counter value.
    Counter(&'static str),
    /// Derived value of the named counter.
    Rate(&'static str),
    /// Wall-clock time of the snapshot.
    Time,
}

/// Dashboard column with its relative width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub title: &'static str,
    pub weight: u16,
    pub source: CellSource,
}

const fn col(title: &'static str, weight: u16, source: CellSource) -> ColumnSpec {
    ColumnSpec {
        title,
        weight,
        source,
    }
}

/// Counter selection and rate rules for one link layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkProfile {
    pub link_layer: LinkLayer,
    /// Allow-list applied to `ethtool -S` output.
    pub ethtool_fields: &'static [&'static str],
    pub rates: &'static [RateSpec],
    pub columns: &'static [ColumnSpec],
}

const ETHERNET_ETHTOOL: &[&str] = &[
    "rx_prio0_bytes",
    "tx_prio0_bytes",
    "rx_prio0_discards",
    "rx_prio5_bytes",
    "tx_prio5_bytes",
    "rx_prio5_discards",
    "rx_prio0_pause",
    "rx_prio0_pause_duration",
    "tx_prio0_pause",
    "tx_prio0_pause_duration",
    "rx_prio5_pause",
    "rx_prio5_pause_duration",
    "tx_prio5_pause",
    "tx_prio5_pause_duration",
];

const INFINIBAND_ETHTOOL: &[&str] = &["rx_vport_rdma_unicast_bytes", "tx_vport_rdma_unicast_bytes"];

const ETHERNET_RATES: &[RateSpec] = &[
    RateSpec {
        counter: "rx_prio0_bytes",
        kind: RateKind::Throughput { multiplier: 1.0 },
    },
    RateSpec {
        counter: "tx_prio0_bytes",
        kind: RateKind::Throughput { multiplier: 1.0 },
    },
    RateSpec {
        counter: "rx_prio5_bytes",
        kind: RateKind::Throughput { multiplier: 1.0 },
    },
    RateSpec {
        counter: "tx_prio5_bytes",
        kind: RateKind::Throughput { multiplier: 1.0 },
    },
    RateSpec {
        counter: "rx_prio0_discards",
        kind: RateKind::Delta,
    },
    RateSpec {
        counter: "rx_prio5_discards",
        kind: RateKind::Delta,
    },
    RateSpec {
        counter: "out_of_sequence",
        kind: RateKind::Delta,
    },
];

// port_rcv_data / port_xmit_data count 32-bit words per lane.
const INFINIBAND_RATES: &[RateSpec] = &[
    RateSpec {
        counter: "port_rcv_data",
        kind: RateKind::Throughput { multiplier: 4.0 },
    },
    RateSpec {
        counter: "port_xmit_data",
        kind: RateKind::Throughput { multiplier: 4.0 },
    },
    RateSpec {
        counter: "out_of_sequence",
        kind: RateKind::Delta,
    },
];

const ETHERNET_COLUMNS: &[ColumnSpec] = &[
    col("Device", 8, CellSource::DeviceName),
    col("Speed", 6, CellSource::Counter("portSpeed")),
    col("Q0 RX(Gbps)", 12, CellSource::Rate("rx_prio0_bytes")),
    col("Q0 TX(Gbps)", 12, CellSource::Rate("tx_prio0_bytes")),
    col("Q0 Discard", 8, CellSource::Rate("rx_prio0_discards")),
    col("Q5 RX(Gbps)", 12, CellSource::Rate("rx_prio5_bytes")),
    col("Q5 TX(Gbps)", 12, CellSource::Rate("tx_prio5_bytes")),
    col("Q5 Discard", 8, CellSource::Rate("rx_prio5_discards")),
    col("OOS", 5, CellSource::Rate("out_of_sequence")),
    col("QP Num", 7, CellSource::Counter("QPNum")),
    col("MR Num", 7, CellSource::Counter("MRNum")),
    col("RX Pause", 7, CellSource::Counter("rx_prio5_pause")),
    col("TX Pause", 7, CellSource::Counter("tx_prio5_pause")),
    col("NP CNP Sent", 9, CellSource::Counter("np_cnp_sent")),
    col("RP CNP Handled", 9, CellSource::Counter("rp_cnp_handled")),
    col("Time", 8, CellSource::Time),
];

const INFINIBAND_COLUMNS: &[ColumnSpec] = &[
    col("Device", 8, CellSource::DeviceName),
    col("Speed", 6, CellSource::Counter("portSpeed")),
    col("RX(Gbps)", 12, CellSource::Rate("port_rcv_data")),
    col("TX(Gbps)", 12, CellSource::Rate("port_xmit_data")),
    col("OOS", 5, CellSource::Rate("out_of_sequence")),
    col("QP Num", 7, CellSource::Counter("QPNum")),
    col("MR Num", 7, CellSource::Counter("MRNum")),
    col("Time", 8, CellSource::Time),
];

const UNKNOWN_COLUMNS: &[ColumnSpec] = &[
    col("Device", 8, CellSource::DeviceName),
    col("Speed", 6, CellSource::Counter("portSpeed")),
    col("QP Num", 7, CellSource::Counter("QPNum")),
    col("MR Num", 7, CellSource::Counter("MRNum")),
    col("Time", 8, CellSource::Time),
];

pub const ETHERNET: LinkProfile = LinkProfile {
    link_layer: LinkLayer::Ethernet,
    ethtool_fields: ETHERNET_ETHTOOL,
    rates: ETHERNET_RATES,
    columns: ETHERNET_COLUMNS,
};

pub const INFINIBAND: LinkProfile = LinkProfile {
    link_layer: LinkLayer::InfiniBand,
    ethtool_fields: INFINIBAND_ETHTOOL,
    rates: INFINIBAND_RATES,
    columns: INFINIBAND_COLUMNS,
};

pub const UNKNOWN: LinkProfile = LinkProfile {
    link_layer: LinkLayer::Unknown,
    ethtool_fields: &[],
    rates: &[],
    columns: UNKNOWN_COLUMNS,
};

impl LinkProfile {
    /// Returns the profile for a link layer.
    pub fn for_link(link_layer: LinkLayer) -> &'static LinkProfile {
        match link_layer {
            LinkLayer::Ethernet => &ETHERNET,
            LinkLayer::InfiniBand => &INFINIBAND,
            LinkLayer::Unknown => &UNKNOWN,
        }
    }

    pub fn rate_for(&self, counter: &str) -> Option<&RateSpec> {
        self.rates.iter().find(|r| r.counter == counter)
    }
}
