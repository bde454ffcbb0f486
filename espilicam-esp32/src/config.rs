// Board configuration, read from cfg.toml at compile time (see cfg.toml.example)

#[toml_cfg::toml_config]
pub struct Config {
    #[default("")]
    wifi_ssid: &'static str,
    #[default("")]
    wifi_psk: &'static str,

    #[default(-1)]
    pin_pwdn: i32,
    #[default(-1)]
    pin_reset: i32,
    #[default(21)]
    pin_xclk: i32,
    #[default(26)]
    pin_sda: i32,
    #[default(27)]
    pin_scl: i32,
    #[default(35)]
    pin_d7: i32,
    #[default(34)]
    pin_d6: i32,
    #[default(39)]
    pin_d5: i32,
    #[default(36)]
    pin_d4: i32,
    #[default(19)]
    pin_d3: i32,
    #[default(18)]
    pin_d2: i32,
    #[default(5)]
    pin_d1: i32,
    #[default(4)]
    pin_d0: i32,
    #[default(25)]
    pin_vsync: i32,
    #[default(23)]
    pin_href: i32,
    #[default(22)]
    pin_pclk: i32,
    #[default(20)]
    xclk_mhz: i32,
}
