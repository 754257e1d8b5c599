fn main() {
  rehab_monitor_lib::run()
}
