fn main() {
    catchlog_lib::run()
}
